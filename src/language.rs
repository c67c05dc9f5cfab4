use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

use crate::config::LanguageConfig;

/// Languages the grader knows how to build and run
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    /// Native-compiled, produces a standalone binary
    #[serde(rename = "c++", alias = "cpp")]
    Cpp,
    /// Managed-compiled, run through the JVM launcher by class name
    #[serde(rename = "java")]
    Java,
    /// Interpreted, no build step
    #[serde(rename = "python", alias = "python3")]
    Python,
}

impl Language {
    /// Tag used on the wire and in configuration files
    pub fn tag(self) -> &'static str {
        match self {
            Language::Cpp => "c++",
            Language::Java => "java",
            Language::Python => "python",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Textual substitution applied to the source before it is written
///
/// Every occurrence of `placeholder` is replaced by `replacement`, in which
/// `%ENTRY%` stands for the per-run entry-point name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPointRule {
    pub placeholder: String,
    pub replacement: String,
}

/// How to stage, build and run one language
///
/// Command templates understand the following placeholders:
/// `%INPUT%` (source file), `%OUTPUT%` (binary produced by the build),
/// `%ENTRY%` (unique entry-point name) and `%DIR%` (the unit's directory).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageProfile {
    pub extension: String,
    /// Prepended to the run token to form the entry-point name
    pub entry_prefix: String,
    /// `None` for interpreted languages
    pub build: Option<Vec<String>>,
    pub run: Vec<String>,
    pub entry_point: Option<EntryPointRule>,
}

impl LanguageProfile {
    pub fn builtin(language: Language) -> Self {
        match language {
            Language::Cpp => Self {
                extension: "cpp".to_string(),
                entry_prefix: String::new(),
                build: Some(strings(&["g++", "%INPUT%", "-o", "%OUTPUT%"])),
                run: strings(&["%OUTPUT%"]),
                entry_point: None,
            },
            Language::Java => Self {
                extension: "java".to_string(),
                // Class names must not start with a digit
                entry_prefix: "C".to_string(),
                build: Some(strings(&["javac", "%INPUT%"])),
                run: strings(&["java", "-cp", "%DIR%", "%ENTRY%"]),
                entry_point: Some(EntryPointRule {
                    placeholder: "class Main".to_string(),
                    replacement: "class %ENTRY%".to_string(),
                }),
            },
            Language::Python => Self {
                extension: "py".to_string(),
                entry_prefix: String::new(),
                build: None,
                run: strings(&["python3", "%INPUT%"]),
                entry_point: None,
            },
        }
    }

    pub fn is_interpreted(&self) -> bool {
        self.build.is_none()
    }

    /// Whether running the program requires the binary written by the build
    pub fn runs_build_output(&self) -> bool {
        self.run.iter().any(|arg| arg.contains("%OUTPUT%"))
    }

    fn apply_override(&mut self, config: &LanguageConfig) {
        if let Some(build) = &config.build {
            // An empty build command turns the language into an interpreted one
            self.build = if build.is_empty() {
                None
            } else {
                Some(build.clone())
            };
        }
        if let Some(run) = &config.run {
            self.run = run.clone();
        }
    }
}

/// The language strategy table used by a pipeline
#[derive(Debug, Clone)]
pub struct Toolchains {
    cpp: LanguageProfile,
    java: LanguageProfile,
    python: LanguageProfile,
}

impl Toolchains {
    /// Builds the table from the built-in profiles, with configured overrides applied in order
    pub fn new(overrides: &[LanguageConfig]) -> Self {
        let mut toolchains = Self {
            cpp: LanguageProfile::builtin(Language::Cpp),
            java: LanguageProfile::builtin(Language::Java),
            python: LanguageProfile::builtin(Language::Python),
        };

        for config in overrides {
            if config.run.as_ref().is_some_and(|run| run.is_empty()) {
                log::warn!("Ignoring empty run command for language {}", config.name);
                continue;
            }
            toolchains.profile_mut(config.name).apply_override(config);
            log::debug!("Applied toolchain override for language {}", config.name);
        }

        toolchains
    }

    pub fn profile(&self, language: Language) -> &LanguageProfile {
        match language {
            Language::Cpp => &self.cpp,
            Language::Java => &self.java,
            Language::Python => &self.python,
        }
    }

    fn profile_mut(&mut self, language: Language) -> &mut LanguageProfile {
        match language {
            Language::Cpp => &mut self.cpp,
            Language::Java => &mut self.java,
            Language::Python => &mut self.python,
        }
    }
}

impl Default for Toolchains {
    fn default() -> Self {
        Self::new(&[])
    }
}

/// Applies template substitutions to every command argument
pub fn apply_template(cmd_template: &[String], mapping: &HashMap<&str, &str>) -> Vec<String> {
    cmd_template
        .iter()
        .map(|s| {
            let mut t = s.clone();
            for (k, v) in mapping.iter() {
                t = t.replace(k, v);
            }
            t
        })
        .collect()
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_tags_deserialize() {
        let parsed: Vec<Language> =
            serde_json::from_str(r#"["c++", "cpp", "java", "python", "python3"]"#).unwrap();
        assert_eq!(
            parsed,
            vec![
                Language::Cpp,
                Language::Cpp,
                Language::Java,
                Language::Python,
                Language::Python
            ]
        );
        assert!(serde_json::from_str::<Language>(r#""cobol""#).is_err());
    }

    #[test]
    fn test_builtin_profiles_cover_all_variants() {
        let toolchains = Toolchains::default();
        assert!(!toolchains.profile(Language::Cpp).is_interpreted());
        assert!(toolchains.profile(Language::Cpp).runs_build_output());
        assert!(!toolchains.profile(Language::Java).is_interpreted());
        assert!(toolchains.profile(Language::Java).entry_point.is_some());
        assert!(toolchains.profile(Language::Python).is_interpreted());
        assert!(!toolchains.profile(Language::Python).runs_build_output());
    }

    #[test]
    fn test_apply_template() {
        let mut mapping = HashMap::new();
        mapping.insert("%INPUT%", "/w/a.cpp");
        mapping.insert("%OUTPUT%", "/w/a");
        let template = strings(&["g++", "%INPUT%", "-o", "%OUTPUT%", "-DOUT=%OUTPUT%"]);
        assert_eq!(
            apply_template(&template, &mapping),
            strings(&["g++", "/w/a.cpp", "-o", "/w/a", "-DOUT=/w/a"])
        );
    }

    #[test]
    fn test_overrides() {
        let overrides = vec![
            LanguageConfig {
                name: Language::Cpp,
                build: Some(strings(&["clang++", "%INPUT%", "-o", "%OUTPUT%"])),
                run: None,
            },
            LanguageConfig {
                name: Language::Java,
                build: Some(vec![]),
                run: Some(strings(&["java", "%INPUT%"])),
            },
            LanguageConfig {
                name: Language::Python,
                build: None,
                run: Some(vec![]),
            },
        ];
        let toolchains = Toolchains::new(&overrides);

        let cpp = toolchains.profile(Language::Cpp);
        assert_eq!(cpp.build.as_ref().unwrap()[0], "clang++");
        assert_eq!(cpp.run, strings(&["%OUTPUT%"]));

        let java = toolchains.profile(Language::Java);
        assert!(java.is_interpreted());
        assert_eq!(java.run, strings(&["java", "%INPUT%"]));

        // Empty run commands are rejected
        assert_eq!(
            toolchains.profile(Language::Python),
            &LanguageProfile::builtin(Language::Python)
        );
    }
}
