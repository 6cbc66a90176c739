// ABOUTME: Entries of the generated environment file as written in the config.
// ABOUTME: Literal values or lookups in the operator's environment, resolved into redacted entries.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::plan::EnvEntries;

/// Where one entry of the environment file gets its value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    /// `{ env: NAME, default: ... }`, read when the plan is built.
    FromEnv {
        env: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl EnvValue {
    /// The value, or the name of the unset variable it needed.
    fn lookup(&self) -> std::result::Result<String, &str> {
        match self {
            EnvValue::Literal(value) => Ok(value.clone()),
            EnvValue::FromEnv { env, default } => std::env::var(env)
                .ok()
                .or_else(|| default.clone())
                .ok_or(env.as_str()),
        }
    }
}

fn is_env_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Resolve every entry for the env file.
///
/// All unset variables are reported in one error. Keys must be shell variable
/// names and values must fit on one line, since the file is `KEY=value` lines.
pub fn resolve_env_entries(entries: &BTreeMap<String, EnvValue>) -> Result<EnvEntries> {
    let mut resolved = BTreeMap::new();
    let mut missing = Vec::new();

    for (key, value) in entries {
        if !is_env_key(key) {
            return Err(Error::InvalidConfig(format!(
                "environment key '{key}' is not a valid variable name"
            )));
        }
        match value.lookup() {
            Ok(value) if value.contains('\n') => {
                return Err(Error::InvalidConfig(format!(
                    "environment value for {key} spans multiple lines"
                )));
            }
            Ok(value) => {
                resolved.insert(key.clone(), value);
            }
            Err(var) => missing.push(var),
        }
    }

    if !missing.is_empty() {
        return Err(Error::MissingEnvVar(missing.join(", ")));
    }
    Ok(EnvEntries::new(resolved))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_env(var: &str, default: Option<&str>) -> EnvValue {
        EnvValue::FromEnv {
            env: var.to_string(),
            default: default.map(String::from),
        }
    }

    #[test]
    fn literals_and_environment_lookups_resolve_together() {
        temp_env::with_var("DECKHAND_TEST_SECRET", Some("s3cret"), || {
            let entries = BTreeMap::from([
                (
                    "DATABASE_URL".to_string(),
                    EnvValue::Literal("postgres://db:5432/app".to_string()),
                ),
                ("API_KEY".to_string(), from_env("DECKHAND_TEST_SECRET", None)),
            ]);

            let resolved = resolve_env_entries(&entries).unwrap();
            assert_eq!(
                resolved.render(),
                "API_KEY=s3cret\nDATABASE_URL=postgres://db:5432/app\n"
            );
        });
    }

    #[test]
    fn unset_variables_fall_back_to_default_or_are_all_reported() {
        temp_env::with_vars_unset(["DECKHAND_TEST_UNSET_A", "DECKHAND_TEST_UNSET_B"], || {
            let with_default = BTreeMap::from([(
                "MODE".to_string(),
                from_env("DECKHAND_TEST_UNSET_A", Some("fallback")),
            )]);
            assert_eq!(
                resolve_env_entries(&with_default).unwrap().render(),
                "MODE=fallback\n"
            );

            let without = BTreeMap::from([
                ("A".to_string(), from_env("DECKHAND_TEST_UNSET_A", None)),
                ("B".to_string(), from_env("DECKHAND_TEST_UNSET_B", None)),
            ]);
            let err = resolve_env_entries(&without).unwrap_err().to_string();
            assert!(err.contains("DECKHAND_TEST_UNSET_A"), "{err}");
            assert!(err.contains("DECKHAND_TEST_UNSET_B"), "{err}");
        });
    }

    #[test]
    fn keys_and_values_must_fit_the_file_format() {
        for key in ["1ST", "WITH SPACE", "A=B", ""] {
            let entries = BTreeMap::from([(key.to_string(), EnvValue::Literal("x".into()))]);
            assert!(
                matches!(resolve_env_entries(&entries), Err(Error::InvalidConfig(_))),
                "{key:?}"
            );
        }

        let entries = BTreeMap::from([(
            "CERT".to_string(),
            EnvValue::Literal("line one\nline two".into()),
        )]);
        assert!(matches!(
            resolve_env_entries(&entries),
            Err(Error::InvalidConfig(_))
        ));
    }
}
