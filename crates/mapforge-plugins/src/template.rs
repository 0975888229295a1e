//! Placeholder expansion for plugin argument templates.
//!
//! Manifests describe command lines as templates such as
//! `["-verbose", "{input}"]`. The recognised placeholders are `{mapping}`,
//! `{input}`, `{output}` and `{workdir}`; anything else in braces is kept
//! verbatim.

use std::ffi::OsString;
use std::path::Path;

/// Paths available to argument templates for one mapping request.
#[derive(Debug, Clone, Copy)]
pub struct MappingPaths<'a> {
    mapping: &'a Path,
    input: &'a Path,
    output: &'a Path,
    workdir: Option<&'a Path>,
}

impl<'a> MappingPaths<'a> {
    /// Bundles the request paths.
    #[must_use]
    pub const fn new(mapping: &'a Path, input: &'a Path, output: &'a Path) -> Self {
        Self {
            mapping,
            input,
            output,
            workdir: None,
        }
    }

    /// Makes `{workdir}` resolve to `workdir`.
    #[must_use]
    pub const fn with_workdir(mut self, workdir: &'a Path) -> Self {
        self.workdir = Some(workdir);
        self
    }

    /// Returns the mapping file path.
    #[must_use]
    pub const fn mapping(&self) -> &'a Path {
        self.mapping
    }

    /// Returns the input file path.
    #[must_use]
    pub const fn input(&self) -> &'a Path {
        self.input
    }

    /// Returns the output file path.
    #[must_use]
    pub const fn output(&self) -> &'a Path {
        self.output
    }

    fn lookup(&self, placeholder: &str) -> Option<&'a Path> {
        match placeholder {
            "mapping" => Some(self.mapping),
            "input" => Some(self.input),
            "output" => Some(self.output),
            "workdir" => self.workdir,
            _ => None,
        }
    }
}

/// Expands every known placeholder in `template`.
///
/// # Example
///
/// ```
/// use std::path::Path;
/// use mapforge_plugins::template::{MappingPaths, expand};
///
/// let paths = MappingPaths::new(Path::new("m.json"), Path::new("in.png"), Path::new("out.txt"));
/// assert_eq!(expand("--src={input}", &paths), "--src=in.png");
/// assert_eq!(expand("{unknown}", &paths), "{unknown}");
/// ```
#[must_use]
pub fn expand(template: &str, paths: &MappingPaths<'_>) -> OsString {
    let mut expanded = OsString::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let (literal, candidate) = rest.split_at(start);
        expanded.push(literal);
        let resolved = candidate.find('}').and_then(|end| {
            let name = candidate.get(1..end)?;
            paths.lookup(name).map(|path| (path, end))
        });
        match resolved {
            Some((path, end)) => {
                expanded.push(path);
                rest = candidate.get(end + 1..).unwrap_or_default();
            }
            None => {
                expanded.push("{");
                rest = candidate.get(1..).unwrap_or_default();
            }
        }
    }
    expanded.push(rest);
    expanded
}

/// Expands each template in order.
#[must_use]
pub fn expand_all(templates: &[String], paths: &MappingPaths<'_>) -> Vec<OsString> {
    templates
        .iter()
        .map(|template| expand(template, paths))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::plain("-verbose", "-verbose")]
    #[case::whole("{input}", "/data/in.png")]
    #[case::embedded("--out={output}.tmp", "--out=/data/out.txt.tmp")]
    #[case::several("{mapping}:{input}", "/data/map.json:/data/in.png")]
    #[case::workdir("{workdir}/run.py", "/opt/plugin/run.py")]
    #[case::unknown("{nope}", "{nope}")]
    #[case::unterminated("{input", "{input")]
    #[case::stray_close("a}b", "a}b")]
    #[case::nested("{{input}}", "{/data/in.png}")]
    fn expands_placeholders(#[case] template: &str, #[case] expected: &str) {
        let paths = MappingPaths::new(
            Path::new("/data/map.json"),
            Path::new("/data/in.png"),
            Path::new("/data/out.txt"),
        )
        .with_workdir(Path::new("/opt/plugin"));
        assert_eq!(expand(template, &paths), expected);
    }

    #[test]
    fn workdir_without_value_is_left_verbatim() {
        let paths = MappingPaths::new(Path::new("m"), Path::new("i"), Path::new("o"));
        assert_eq!(expand("{workdir}", &paths), "{workdir}");
    }
}
