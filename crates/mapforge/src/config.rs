//! Configuration loading helpers for the mapforge CLI.
//!
//! Leading arguments that name configuration flags are routed to
//! `ortho_config`; everything from the first other token onwards belongs to
//! clap.

use std::ffi::{OsStr, OsString};

use mapforge_config::Config;
use ortho_config::OrthoConfig as _;

use crate::AppError;

pub(crate) trait ConfigLoader {
    /// Loads configuration from the filtered configuration arguments.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Skip,
}

fn classify(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    let (flag, has_inline_value) = text
        .split_once('=')
        .map_or((text.as_ref(), false), |(flag, _)| (flag, true));
    if super::CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !has_inline_value,
        }
    } else {
        FlagAction::Skip
    }
}

/// Arguments split between the configuration loader and clap.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ConfigArgumentSplit {
    pub(crate) config_arguments: Vec<OsString>,
    pub(crate) command_arguments: Vec<OsString>,
}

pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let program: Vec<OsString> = args.first().cloned().into_iter().collect();
    let mut config_arguments = program.clone();
    let mut consumed = 0_usize;
    let mut pending_value = false;

    for argument in args.iter().skip(1) {
        if pending_value {
            pending_value = false;
        } else {
            match classify(argument) {
                FlagAction::Include { needs_value } => pending_value = needs_value,
                FlagAction::Skip => break,
            }
        }
        config_arguments.push(argument.clone());
        consumed += 1;
    }

    let mut command_arguments = program;
    command_arguments.extend(args.iter().skip(1 + consumed).cloned());
    ConfigArgumentSplit {
        config_arguments,
        command_arguments,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[rstest]
    #[case::separate_value("--plugin-dir", FlagAction::Include { needs_value: true })]
    #[case::inline_value("--log-filter=debug", FlagAction::Include { needs_value: false })]
    #[case::subcommand("list", FlagAction::Skip)]
    #[case::unknown_flag("--verbose", FlagAction::Skip)]
    fn flags_are_classified(#[case] argument: &str, #[case] expected: FlagAction) {
        assert_eq!(classify(OsStr::new(argument)), expected);
    }

    #[test]
    fn leading_config_flags_are_split_from_the_command() {
        let split = split_config_arguments(&os(&[
            "mapforge",
            "--plugin-dir",
            "/srv/plugins",
            "--log-format=compact",
            "map",
            "Copy_1.0",
            "--plugin-dir",
        ]));

        assert_eq!(
            split.config_arguments,
            os(&["mapforge", "--plugin-dir", "/srv/plugins", "--log-format=compact"])
        );
        assert_eq!(
            split.command_arguments,
            os(&["mapforge", "map", "Copy_1.0", "--plugin-dir"])
        );
    }

    #[test]
    fn empty_arguments_split_into_nothing() {
        let split = split_config_arguments(&[]);
        assert!(split.config_arguments.is_empty());
        assert!(split.command_arguments.is_empty());
    }
}
