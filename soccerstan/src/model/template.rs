//! Compiler for model templates.
//!
//! A template is a sequence of statements, one per line; `#` starts a comment.
//!
//! ```text
//! scalar intercept ~ normal(0, 1)
//! team attack ~ normal(0, 1)
//! team defence ~ normal(0, 1)
//! home_log_rate = intercept + attack[home] - defence[away]
//! away_log_rate = intercept + attack[away] - defence[home]
//! ```
//!
//! Home and away goals are modelled as independent Poisson counts whose log-rates are the
//! given sums of parameters. Team parameters must be indexed by the `home` or `away` team of
//! the fixture.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use bincode::{Decode, Encode};
use thiserror::Error;

use crate::model::ModelIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum ParamKind {
    Scalar,
    Team,
}
impl Display for ParamKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamKind::Scalar => write!(f, "scalar"),
            ParamKind::Team => write!(f, "team"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum Prior {
    Normal { mu: f64, sigma: f64 },
}
impl Prior {
    /// Log-density up to an additive constant.
    #[inline]
    pub fn log_density(&self, value: f64) -> f64 {
        match self {
            Prior::Normal { mu, sigma } => -0.5 * ((value - mu) / sigma).powi(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct ParamDecl {
    pub name: String,
    pub kind: ParamKind,
    pub prior: Prior,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum Side {
    Home,
    Away,
}

/// A signed reference to a declared parameter. `index` is present exactly for team parameters.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Term {
    pub negated: bool,
    pub param: usize,
    pub index: Option<Side>,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct CompiledModel {
    pub name: String,
    /// In declaration order.
    pub params: Vec<ParamDecl>,
    pub home_log_rate: Vec<Term>,
    pub away_log_rate: Vec<Term>,
}
impl CompiledModel {
    pub fn param(&self, name: &str) -> Option<&ParamDecl> {
        self.params.iter().find(|param| param.name == name)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CompileError {
    #[error("line {line}: unrecognised statement '{text}'")]
    UnknownStatement { line: usize, text: String },

    #[error("line {line}: invalid parameter name '{name}'")]
    InvalidName { line: usize, name: String },

    #[error("line {line}: parameter '{name}' is already declared")]
    DuplicateParameter { line: usize, name: String },

    #[error("line {line}: invalid prior '{text}', expected normal(<mu>, <sigma>) with sigma > 0")]
    InvalidPrior { line: usize, text: String },

    #[error("line {line}: {rate} is defined more than once")]
    DuplicateRate { line: usize, rate: &'static str },

    #[error("line {line}: undeclared parameter '{name}'")]
    UndeclaredParameter { line: usize, name: String },

    #[error("line {line}: team parameter '{name}' must be indexed by [home] or [away]")]
    UnindexedTeamParameter { line: usize, name: String },

    #[error("line {line}: scalar parameter '{name}' cannot be indexed")]
    IndexedScalar { line: usize, name: String },

    #[error("line {line}: invalid index '{index}', expected home or away")]
    InvalidIndex { line: usize, index: String },

    #[error("line {line}: malformed expression '{text}'")]
    MalformedExpression { line: usize, text: String },

    #[error("missing definition of {0}")]
    MissingRate(&'static str),

    #[error("template declares no parameters")]
    NoParameters,

    #[error("model '{model}' lists {listed:?} as {kind} parameters but its template declares {declared:?}")]
    IdentityMismatch {
        model: String,
        kind: ParamKind,
        listed: BTreeSet<String>,
        declared: BTreeSet<String>,
    },
}

const HOME_LOG_RATE: &str = "home_log_rate";
const AWAY_LOG_RATE: &str = "away_log_rate";
const RESERVED: [&str; 7] = ["scalar", "team", "normal", "home", "away", HOME_LOG_RATE, AWAY_LOG_RATE];

/// Compiles the template of `identity`, checking that the parameters it declares are exactly
/// those listed by the identity.
pub fn compile(identity: &ModelIdentity) -> Result<CompiledModel, CompileError> {
    let mut params: Vec<ParamDecl> = vec![];
    let mut home_log_rate = None;
    let mut away_log_rate = None;

    for (index, line) in identity.template.lines().enumerate() {
        let line_no = index + 1;
        let statement = match line.find('#') {
            Some(comment) => &line[..comment],
            None => line,
        }
        .trim();
        if statement.is_empty() {
            continue;
        }

        let declaration = statement
            .strip_prefix("scalar ")
            .map(|rest| (ParamKind::Scalar, rest))
            .or_else(|| statement.strip_prefix("team ").map(|rest| (ParamKind::Team, rest)));
        if let Some((kind, rest)) = declaration {
            let decl = parse_declaration(line_no, kind, rest)?;
            if params.iter().any(|param| param.name == decl.name) {
                return Err(CompileError::DuplicateParameter {
                    line: line_no,
                    name: decl.name,
                });
            }
            params.push(decl);
        } else if let Some((lhs, rhs)) = statement.split_once('=') {
            let (rate, slot) = match lhs.trim() {
                HOME_LOG_RATE => (HOME_LOG_RATE, &mut home_log_rate),
                AWAY_LOG_RATE => (AWAY_LOG_RATE, &mut away_log_rate),
                _ => {
                    return Err(CompileError::UnknownStatement {
                        line: line_no,
                        text: statement.into(),
                    })
                }
            };
            if slot.is_some() {
                return Err(CompileError::DuplicateRate { line: line_no, rate });
            }
            *slot = Some(parse_expression(line_no, rhs, &params)?);
        } else {
            return Err(CompileError::UnknownStatement {
                line: line_no,
                text: statement.into(),
            });
        }
    }

    if params.is_empty() {
        return Err(CompileError::NoParameters);
    }
    let home_log_rate = home_log_rate.ok_or(CompileError::MissingRate(HOME_LOG_RATE))?;
    let away_log_rate = away_log_rate.ok_or(CompileError::MissingRate(AWAY_LOG_RATE))?;
    check_identity(identity, &params, ParamKind::Scalar, &identity.parameters)?;
    check_identity(identity, &params, ParamKind::Team, &identity.team_parameters)?;

    Ok(CompiledModel {
        name: identity.name.clone(),
        params,
        home_log_rate,
        away_log_rate,
    })
}

fn check_identity(
    identity: &ModelIdentity,
    params: &[ParamDecl],
    kind: ParamKind,
    listed: &[String],
) -> Result<(), CompileError> {
    let listed = listed.iter().cloned().collect::<BTreeSet<_>>();
    let declared = params
        .iter()
        .filter(|param| param.kind == kind)
        .map(|param| param.name.clone())
        .collect::<BTreeSet<_>>();
    if listed == declared {
        Ok(())
    } else {
        Err(CompileError::IdentityMismatch {
            model: identity.name.clone(),
            kind,
            listed,
            declared,
        })
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

fn parse_declaration(line: usize, kind: ParamKind, rest: &str) -> Result<ParamDecl, CompileError> {
    let (name, prior) = rest.split_once('~').ok_or_else(|| CompileError::InvalidPrior {
        line,
        text: rest.trim().into(),
    })?;
    let name = name.trim();
    if !is_identifier(name) || RESERVED.contains(&name) {
        return Err(CompileError::InvalidName {
            line,
            name: name.into(),
        });
    }
    Ok(ParamDecl {
        name: name.into(),
        kind,
        prior: parse_prior(line, prior.trim())?,
    })
}

fn parse_prior(line: usize, text: &str) -> Result<Prior, CompileError> {
    let invalid = || CompileError::InvalidPrior {
        line,
        text: text.into(),
    };
    let args = text
        .strip_prefix("normal")
        .map(str::trim_start)
        .and_then(|rest| rest.strip_prefix('('))
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(invalid)?;
    let args = args
        .split(',')
        .map(|arg| arg.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid())?;
    match args[..] {
        [mu, sigma] if mu.is_finite() && sigma.is_finite() && sigma > 0.0 => {
            Ok(Prior::Normal { mu, sigma })
        }
        _ => Err(invalid()),
    }
}

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Plus,
    Minus,
    Open,
    Close,
    Ident(&'a str),
}

fn tokenise(line: usize, text: &str) -> Result<Vec<Token<'_>>, CompileError> {
    let malformed = || CompileError::MalformedExpression {
        line,
        text: text.trim().into(),
    };
    let mut tokens = vec![];
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        let len = match c {
            '+' => {
                tokens.push(Token::Plus);
                1
            }
            '-' => {
                tokens.push(Token::Minus);
                1
            }
            '[' => {
                tokens.push(Token::Open);
                1
            }
            ']' => {
                tokens.push(Token::Close);
                1
            }
            c if c.is_whitespace() => c.len_utf8(),
            c if c.is_ascii_alphabetic() || c == '_' => {
                let len = rest
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .unwrap_or(rest.len());
                tokens.push(Token::Ident(&rest[..len]));
                len
            }
            _ => return Err(malformed()),
        };
        rest = &rest[len..];
    }
    Ok(tokens)
}

fn parse_expression(line: usize, text: &str, params: &[ParamDecl]) -> Result<Vec<Term>, CompileError> {
    let malformed = || CompileError::MalformedExpression {
        line,
        text: text.trim().into(),
    };
    let tokens = tokenise(line, text)?;
    let mut tokens = tokens.into_iter().peekable();
    let mut terms = vec![];
    loop {
        let negated = match tokens.peek() {
            Some(Token::Plus) => {
                tokens.next();
                false
            }
            Some(Token::Minus) => {
                tokens.next();
                true
            }
            Some(_) if terms.is_empty() => false,
            _ => return Err(malformed()),
        };
        let Some(Token::Ident(name)) = tokens.next() else {
            return Err(malformed());
        };
        let param = params
            .iter()
            .position(|param| param.name == name)
            .ok_or_else(|| CompileError::UndeclaredParameter {
                line,
                name: name.into(),
            })?;
        let index = if tokens.peek() == Some(&Token::Open) {
            tokens.next();
            let side = match tokens.next() {
                Some(Token::Ident("home")) => Side::Home,
                Some(Token::Ident("away")) => Side::Away,
                Some(Token::Ident(other)) => {
                    return Err(CompileError::InvalidIndex {
                        line,
                        index: other.into(),
                    })
                }
                _ => return Err(malformed()),
            };
            if tokens.next() != Some(Token::Close) {
                return Err(malformed());
            }
            Some(side)
        } else {
            None
        };
        match (params[param].kind, index) {
            (ParamKind::Scalar, Some(_)) => {
                return Err(CompileError::IndexedScalar {
                    line,
                    name: name.into(),
                })
            }
            (ParamKind::Team, None) => {
                return Err(CompileError::UnindexedTeamParameter {
                    line,
                    name: name.into(),
                })
            }
            _ => {}
        }
        terms.push(Term {
            negated,
            param,
            index,
        });
        if tokens.peek().is_none() {
            return Ok(terms);
        }
    }
}

#[cfg(test)]
mod tests;
