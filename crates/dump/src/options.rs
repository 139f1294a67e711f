//! getopt-like option handling: long options with a single leading dash,
//! accepting any unambiguous prefix abbreviation.

use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptionError {
    #[error("unknown option: -{0}")]
    Unknown(String),
    #[error("ambiguous option -{0}: matches {1}")]
    Ambiguous(String, String),
    #[error("expected {1} argument(s) after -{0}")]
    MissingArgument(String, usize),
}

struct OptionSpec {
    arg_count: usize,
    description: &'static str,
}

/// The set of recognized options, with their argument counts and help text.
pub struct OptionTable {
    specs: BTreeMap<String, OptionSpec>,
}

impl OptionTable {
    pub fn new() -> Self {
        Self {
            specs: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, name: &str, arg_count: usize, description: &'static str) {
        self.specs.insert(
            name.to_owned(),
            OptionSpec {
                arg_count,
                description,
            },
        );
    }

    /// Resolves a possibly-abbreviated option name to its canonical form. An
    /// exact match always wins over prefix matches.
    fn resolve(&self, given: &str) -> Result<String, OptionError> {
        if self.specs.contains_key(given) {
            return Ok(given.to_owned());
        }
        let matches: Vec<&String> = self.specs.keys().filter(|k| k.starts_with(given)).collect();
        match matches.as_slice() {
            [] => Err(OptionError::Unknown(given.to_owned())),
            [one] => Ok((*one).clone()),
            many => Err(OptionError::Ambiguous(
                given.to_owned(),
                many.iter()
                    .map(|name| format!("-{name}"))
                    .collect::<Vec<_>>()
                    .join(", "),
            )),
        }
    }

    pub fn parse(&self, args: &[String]) -> Result<ParsedOptions, OptionError> {
        let mut values: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut files = Vec::new();
        let mut i = 0;
        while i < args.len() {
            let arg = &args[i];
            i += 1;
            let name = match arg.strip_prefix('-') {
                Some(name) if !name.is_empty() => name,
                _ => {
                    files.push(arg.clone());
                    continue;
                }
            };
            let canonical = self.resolve(name)?;
            let spec = &self.specs[&canonical];
            let mut taken = Vec::with_capacity(spec.arg_count);
            for _ in 0..spec.arg_count {
                let Some(value) = args.get(i) else {
                    return Err(OptionError::MissingArgument(canonical, spec.arg_count));
                };
                taken.push(value.clone());
                i += 1;
            }
            values.entry(canonical).or_default().extend(taken);
        }
        Ok(ParsedOptions { values, files })
    }

    /// Tabular description of every option, one per line.
    pub fn describe(&self) -> String {
        let mut out = String::from("Options:\n");
        for (name, spec) in &self.specs {
            out.push_str("    -");
            out.push_str(name);
            for i in 0..spec.arg_count {
                out.push_str(&format!(" arg{}", i + 1));
            }
            out.push_str(": ");
            out.push_str(spec.description);
            out.push('\n');
        }
        out
    }
}

/// The options that were specified, their arguments, and the non-option
/// (file) arguments in order.
pub struct ParsedOptions {
    values: BTreeMap<String, Vec<String>>,
    files: Vec<String>,
}

impl ParsedOptions {
    pub fn has(&self, option: &str) -> bool {
        self.values.contains_key(option)
    }

    pub fn first_argument(&self, option: &str) -> Option<&str> {
        self.values
            .get(option)
            .and_then(|args| args.first())
            .map(String::as_str)
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }
}

#[cfg(test)]
mod parse_tests {
    use super::*;

    fn table() -> OptionTable {
        let mut table = OptionTable::new();
        table.add("debug", 0, "");
        table.add("noclasses", 0, "");
        table.add("nocontent", 0, "");
        table.add("blockdata", 1, "");
        table.add("blockdatamanifest", 1, "");
        table
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn it_should_parse_exact_options_and_files() {
        let opts = table().parse(&args(&["-debug", "a.ser", "b.ser"])).unwrap();
        assert!(opts.has("debug"));
        assert_eq!(vec!["a.ser".to_owned(), "b.ser".to_owned()], opts.files());
    }

    #[test]
    fn it_should_accept_an_unambiguous_prefix() {
        let opts = table().parse(&args(&["-d", "-nocl"])).unwrap();
        assert!(opts.has("debug"));
        assert!(opts.has("noclasses"));
    }

    #[test]
    fn it_should_reject_an_ambiguous_prefix() {
        assert!(matches!(
            table().parse(&args(&["-no"])),
            Err(OptionError::Ambiguous(..))
        ));
    }

    #[test]
    fn it_should_prefer_an_exact_match_over_a_longer_option() {
        let opts = table().parse(&args(&["-blockdata", "out.bin"])).unwrap();
        assert_eq!(Some("out.bin"), opts.first_argument("blockdata"));
        assert!(!opts.has("blockdatamanifest"));
    }

    #[test]
    fn it_should_consume_option_arguments() {
        let opts = table()
            .parse(&args(&["-blockdatam", "manifest.txt", "a.ser"]))
            .unwrap();
        assert_eq!(Some("manifest.txt"), opts.first_argument("blockdatamanifest"));
        assert_eq!(vec!["a.ser".to_owned()], opts.files());
    }

    #[test]
    fn it_should_report_a_missing_argument() {
        assert!(matches!(
            table().parse(&args(&["-blockdata"])),
            Err(OptionError::MissingArgument(..))
        ));
    }

    #[test]
    fn it_should_report_an_unknown_option() {
        assert!(matches!(
            table().parse(&args(&["-zzz"])),
            Err(OptionError::Unknown(..))
        ));
    }

    #[test]
    fn it_should_treat_a_bare_dash_as_a_file() {
        let opts = table().parse(&args(&["-"])).unwrap();
        assert_eq!(vec!["-".to_owned()], opts.files());
    }
}
