//! Source filtering and disambiguation.
//!
//! A lookup can be narrowed to one source via the `@source` positional
//! prefix or the `--from` flag; `--from` wins when both are present. After
//! parsing, the filter carries the canonical source id plus the raw form
//! for diagnostics.

use std::sync::Arc;

use super::set::{CommandInfo, CommandSet};
use super::source::canonical_source_id;
use crate::error::InvowkError;

/// A parsed source filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFilter {
    pub canonical: String,
    pub raw: String,
}

impl SourceFilter {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        Self {
            canonical: canonical_source_id(&raw),
            raw,
        }
    }
}

/// Result of splitting the leading positional tokens.
#[derive(Debug, Clone)]
pub struct ParsedTarget {
    pub filter: Option<SourceFilter>,
    /// The command name token and everything after it.
    pub rest: Vec<String>,
}

/// Interpret the leading `@source` token and the `--from` override.
/// `--from` wins over the positional prefix.
pub fn parse_target(tokens: &[String], from: Option<&str>) -> ParsedTarget {
    let mut filter = None;
    let mut rest = tokens.to_vec();
    if let Some(first) = rest.first() {
        if first.starts_with('@') && first.len() > 1 {
            filter = Some(SourceFilter::new(first.clone()));
            rest.remove(0);
        }
    }
    if let Some(from) = from {
        filter = Some(SourceFilter::new(from));
    }
    ParsedTarget { filter, rest }
}

/// Resolve a name to one command using longest-match over the dotted path.
///
/// `tokens` starts with the command token; following tokens extend the
/// dotted path while a deeper command exists. Returns the resolved command
/// and the number of tokens consumed.
pub fn resolve_target(
    set: &CommandSet,
    filter: Option<&SourceFilter>,
    tokens: &[String],
) -> Result<(Arc<CommandInfo>, usize), InvowkError> {
    let Some(first) = tokens.first() else {
        return Err(InvowkError::CommandNotFound {
            name: String::new(),
        });
    };

    match filter {
        Some(filter) => {
            if !set.source_ids().any(|id| id == filter.canonical) {
                return Err(InvowkError::UnknownSource {
                    name: filter.raw.clone(),
                });
            }
            let mut best: Option<(Arc<CommandInfo>, usize)> = None;
            let mut dotted = first.clone();
            let mut consumed = 1;
            loop {
                if let Some(info) = set.find_in_source(&filter.canonical, &dotted) {
                    best = Some((Arc::clone(info), consumed));
                }
                match tokens.get(consumed) {
                    Some(next) if is_path_segment(next) => {
                        dotted = format!("{dotted}.{next}");
                        consumed += 1;
                    }
                    _ => break,
                }
            }
            best.ok_or_else(|| InvowkError::CommandNotFound {
                name: format!("@{}/{}", filter.canonical, first),
            })
        }
        None => {
            let mut best: Option<(Arc<CommandInfo>, usize)> = None;
            let mut last_err = None;
            let mut dotted = first.clone();
            let mut consumed = 1;
            loop {
                match set.resolve(&dotted) {
                    Ok(info) => best = Some((info, consumed)),
                    Err(err @ InvowkError::AmbiguousCommand { .. }) => return Err(err),
                    Err(err) => last_err = Some(err),
                }
                match tokens.get(consumed) {
                    Some(next) if is_path_segment(next) => {
                        dotted = format!("{dotted}.{next}");
                        consumed += 1;
                    }
                    _ => break,
                }
            }
            match best {
                Some(found) => Ok(found),
                None => Err(last_err.unwrap_or(InvowkError::CommandNotFound {
                    name: first.clone(),
                })),
            }
        }
    }
}

fn is_path_segment(token: &str) -> bool {
    !token.is_empty()
        && !token.starts_with('-')
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
