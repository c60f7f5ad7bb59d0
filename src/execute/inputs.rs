//! Validation of user-supplied positional arguments and flag values
//! against a command's declarations.
//!
//! The CLI layer hands over raw tokens; everything after the command name
//! belongs to the invoked command and is interpreted here, not by clap.

use std::collections::BTreeMap;

use crate::error::InputError;
use crate::invowkfile::{ArgSpec, CommandSpec, FlagSpec};

/// Value bound to one declared argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    /// Provided token or declared default; `None` when optional and unset.
    Single(Option<String>),
    /// Values bound to the variadic tail, possibly empty.
    Variadic(Vec<String>),
}

/// Fully validated inputs of one invocation.
#[derive(Debug, Clone, Default)]
pub struct ResolvedInputs {
    /// Positional tokens as provided, in order.
    pub positionals: Vec<String>,
    /// Values per declared argument, in declaration order.
    pub args: Vec<(String, ArgValue)>,
    /// Flag values by declared name (provided or defaulted).
    pub flags: BTreeMap<String, String>,
}

/// Validate `tokens` against the declarations of `command`.
pub fn resolve(command_name: &str, command: &CommandSpec, tokens: &[String]) -> Result<ResolvedInputs, InputError> {
    let (raw_flags, positionals) = split_tokens(command_name, command, tokens)?;

    let mut flags = BTreeMap::new();
    for (spec, value) in &raw_flags {
        spec.value_type
            .check(value, &spec.values)
            .map_err(|message| InputError::InvalidFlagValue {
                command: command_name.to_string(),
                flag: spec.name.clone(),
                value: value.clone(),
                message,
            })?;
        flags.insert(spec.name.clone(), value.clone());
    }
    for spec in &command.flags {
        if !flags.contains_key(&spec.name) {
            if let Some(default) = &spec.default {
                flags.insert(spec.name.clone(), default.clone());
            }
        }
    }

    let args = bind_positionals(command_name, &command.args, &positionals)?;

    Ok(ResolvedInputs {
        positionals,
        args,
        flags,
    })
}

/// Separate declared flags from positional tokens. `--` ends flag parsing.
fn split_tokens<'a>(
    command_name: &str,
    command: &'a CommandSpec,
    tokens: &[String],
) -> Result<(Vec<(&'a FlagSpec, String)>, Vec<String>), InputError> {
    let mut flags = Vec::new();
    let mut positionals = Vec::new();
    let mut iter = tokens.iter().peekable();
    let mut only_positionals = false;

    while let Some(token) = iter.next() {
        if only_positionals || !token.starts_with('-') || token == "-" {
            positionals.push(token.clone());
            continue;
        }
        if token == "--" {
            only_positionals = true;
            continue;
        }

        let (name_part, inline_value) = match token.split_once('=') {
            Some((name, value)) => (name.to_string(), Some(value.to_string())),
            None => (token.clone(), None),
        };
        let spec = lookup_flag(command, &name_part).ok_or_else(|| InputError::UnknownFlag {
            command: command_name.to_string(),
            flag: name_part.trim_start_matches('-').to_string(),
        })?;

        let value = match inline_value {
            Some(value) => value,
            None if matches!(spec.value_type, crate::invowkfile::ValueType::Bool) => {
                // A bare boolean flag means true; an adjacent literal
                // true/false token is consumed as its value.
                match iter.peek() {
                    Some(next) if matches!(next.as_str(), "true" | "false") => {
                        iter.next().cloned().unwrap_or_else(|| "true".to_string())
                    }
                    _ => "true".to_string(),
                }
            }
            None => iter.next().cloned().ok_or_else(|| InputError::InvalidFlagValue {
                command: command_name.to_string(),
                flag: spec.name.clone(),
                value: String::new(),
                message: "missing value".to_string(),
            })?,
        };
        flags.push((spec, value));
    }

    Ok((flags, positionals))
}

fn lookup_flag<'a>(command: &'a CommandSpec, token: &str) -> Option<&'a FlagSpec> {
    if let Some(name) = token.strip_prefix("--") {
        return command.flags.iter().find(|f| f.name == name);
    }
    let short = token.strip_prefix('-')?;
    let mut chars = short.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    command.flags.iter().find(|f| f.short == Some(c))
}

fn bind_positionals(
    command_name: &str,
    specs: &[ArgSpec],
    positionals: &[String],
) -> Result<Vec<(String, ArgValue)>, InputError> {
    let required = specs.iter().filter(|s| s.required).count();
    if positionals.len() < required {
        let missing = &specs[positionals.len()];
        return Err(InputError::MissingRequired {
            command: command_name.to_string(),
            arg: missing.name.clone(),
        });
    }
    let has_variadic = specs.last().is_some_and(|s| s.variadic);
    if !has_variadic && positionals.len() > specs.len() {
        return Err(InputError::TooMany {
            command: command_name.to_string(),
            expected: specs.len(),
            got: positionals.len(),
        });
    }

    let mut out = Vec::with_capacity(specs.len());
    let mut cursor = 0usize;
    for (idx, spec) in specs.iter().enumerate() {
        if spec.variadic && idx == specs.len() - 1 {
            let values: Vec<String> = positionals[cursor..].to_vec();
            for value in &values {
                check_value(command_name, spec, value)?;
            }
            out.push((spec.name.clone(), ArgValue::Variadic(values)));
            cursor = positionals.len();
        } else if cursor < positionals.len() {
            let value = positionals[cursor].clone();
            check_value(command_name, spec, &value)?;
            out.push((spec.name.clone(), ArgValue::Single(Some(value))));
            cursor += 1;
        } else {
            out.push((spec.name.clone(), ArgValue::Single(spec.default.clone())));
        }
    }
    Ok(out)
}

fn check_value(command_name: &str, spec: &ArgSpec, value: &str) -> Result<(), InputError> {
    spec.value_type
        .check(value, &spec.values)
        .map_err(|message| InputError::InvalidValue {
            command: command_name.to_string(),
            arg: spec.name.clone(),
            value: value.to_string(),
            message,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invowkfile::ValueType;

    fn command(args: Vec<ArgSpec>, flags: Vec<FlagSpec>) -> CommandSpec {
        CommandSpec {
            name: "test".to_string(),
            description: None,
            platforms: vec![],
            workdir: None,
            timeout: None,
            env: Default::default(),
            args,
            flags,
            implementations: vec![],
            deps: None,
            watch: None,
            subcommands: vec![],
        }
    }

    fn arg(name: &str, required: bool, variadic: bool) -> ArgSpec {
        ArgSpec {
            name: name.to_string(),
            value_type: ValueType::String,
            required,
            variadic,
            default: None,
            values: vec![],
            description: None,
        }
    }

    fn flag(name: &str, value_type: ValueType, default: Option<&str>) -> FlagSpec {
        FlagSpec {
            name: name.to_string(),
            short: Some(name.chars().next().unwrap()),
            value_type,
            default: default.map(|s| s.to_string()),
            values: vec![],
            description: None,
        }
    }

    fn strings(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn missing_required_is_typed() {
        let cmd = command(vec![arg("name", true, false)], vec![]);
        let err = resolve("test", &cmd, &[]).unwrap_err();
        assert!(matches!(err, InputError::MissingRequired { ref arg, .. } if arg == "name"));
    }

    #[test]
    fn too_many_without_variadic_tail() {
        let cmd = command(vec![arg("one", true, false)], vec![]);
        let err = resolve("test", &cmd, &strings(&["a", "b"])).unwrap_err();
        assert!(matches!(err, InputError::TooMany { expected: 1, got: 2, .. }));
    }

    #[test]
    fn variadic_tail_takes_the_rest() {
        let cmd = command(
            vec![arg("name", true, false), arg("rest", false, true)],
            vec![],
        );
        let inputs = resolve("test", &cmd, &strings(&["alpha", "one", "two", "three"])).unwrap();
        assert_eq!(inputs.positionals.len(), 4);
        assert_eq!(
            inputs.args[0],
            ("name".to_string(), ArgValue::Single(Some("alpha".to_string())))
        );
        assert_eq!(
            inputs.args[1],
            (
                "rest".to_string(),
                ArgValue::Variadic(strings(&["one", "two", "three"]))
            )
        );
    }

    #[test]
    fn optional_args_take_declared_defaults() {
        let mut spec = arg("target", false, false);
        spec.default = Some("dev".to_string());
        let cmd = command(vec![spec], vec![]);
        let inputs = resolve("test", &cmd, &[]).unwrap();
        assert_eq!(
            inputs.args[0],
            ("target".to_string(), ArgValue::Single(Some("dev".to_string())))
        );
    }

    #[test]
    fn flag_forms_are_equivalent() {
        let cmd = command(vec![], vec![flag("target", ValueType::String, Some("dev"))]);
        for tokens in [
            strings(&["--target=prod"]),
            strings(&["--target", "prod"]),
            strings(&["-t", "prod"]),
        ] {
            let inputs = resolve("test", &cmd, &tokens).unwrap();
            assert_eq!(inputs.flags.get("target").unwrap(), "prod");
        }
    }

    #[test]
    fn flag_defaults_apply_when_not_provided() {
        let cmd = command(vec![], vec![flag("target", ValueType::String, Some("dev"))]);
        let inputs = resolve("test", &cmd, &[]).unwrap();
        assert_eq!(inputs.flags.get("target").unwrap(), "dev");
    }

    #[test]
    fn bool_flag_without_value_means_true() {
        let cmd = command(vec![], vec![flag("force", ValueType::Bool, Some("false"))]);
        let inputs = resolve("test", &cmd, &strings(&["--force"])).unwrap();
        assert_eq!(inputs.flags.get("force").unwrap(), "true");
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let cmd = command(vec![], vec![]);
        let err = resolve("test", &cmd, &strings(&["--nope"])).unwrap_err();
        assert!(matches!(err, InputError::UnknownFlag { ref flag, .. } if flag == "nope"));
    }

    #[test]
    fn flag_choices_are_enforced() {
        let mut f = flag("env", ValueType::String, None);
        f.values = strings(&["dev", "prod"]);
        let cmd = command(vec![], vec![f]);
        let err = resolve("test", &cmd, &strings(&["--env", "staging"])).unwrap_err();
        assert!(matches!(err, InputError::InvalidFlagValue { .. }));
    }

    #[test]
    fn double_dash_ends_flag_parsing() {
        let cmd = command(vec![arg("rest", false, true)], vec![]);
        let inputs = resolve("test", &cmd, &strings(&["--", "--not-a-flag"])).unwrap();
        assert_eq!(inputs.positionals, strings(&["--not-a-flag"]));
    }

    #[test]
    fn typed_arg_values_are_checked() {
        let mut spec = arg("count", true, false);
        spec.value_type = ValueType::Int;
        let cmd = command(vec![spec], vec![]);
        assert!(resolve("test", &cmd, &strings(&["5"])).is_ok());
        let err = resolve("test", &cmd, &strings(&["five"])).unwrap_err();
        assert!(matches!(err, InputError::InvalidValue { .. }));
    }
}
