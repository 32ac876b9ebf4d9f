// ─────────────────────────────────────────────────────────────────────
// BCDI Phase Retrieval — Operator Recipes
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Textual operator pipelines such as `"(ER * HIO^20)^5 * SHRINK"`.
//!
//! ```text
//! expr    := term ('*' term)*
//! term    := factor ('^' INTEGER)?
//! factor  := NAME | '(' expr ')'
//! NAME    := ER | EROPT | HIO | HIOOPT | SHRINK | CENTER
//! ```
//!
//! `*` composes right to left like [`sequence`]; `^` is [`repeat`].
//! Names are case-insensitive.

use std::fmt;

use bcdi_types::config::ReconstructionConfig;
use bcdi_types::constants::MAX_RECIPE_APPLICATIONS;
use bcdi_types::error::{BcdiError, BcdiResult};
use log::info;

use crate::center::Center;
use crate::er::{Er, ErOpt};
use crate::hio::{Hio, HioOpt};
use crate::operator::{repeat, sequence, Operator, OperatorList};
use crate::shrink::Shrink;
use crate::state::State;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Er,
    ErOpt,
    Hio,
    HioOpt,
    Shrink,
    Center,
}

impl OpKind {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "ER" => Some(OpKind::Er),
            "EROPT" => Some(OpKind::ErOpt),
            "HIO" => Some(OpKind::Hio),
            "HIOOPT" => Some(OpKind::HioOpt),
            "SHRINK" => Some(OpKind::Shrink),
            "CENTER" => Some(OpKind::Center),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            OpKind::Er => "ER",
            OpKind::ErOpt => "EROPT",
            OpKind::Hio => "HIO",
            OpKind::HioOpt => "HIOOPT",
            OpKind::Shrink => "SHRINK",
            OpKind::Center => "CENTER",
        }
    }

    /// Construct one operator instance with parameters from `config`.
    fn build(self, config: &ReconstructionConfig, state: &State<'_>) -> BcdiResult<OperatorList> {
        let list = match self {
            OpKind::Er => OperatorList::from_operator(Er::new()),
            OpKind::ErOpt => {
                OperatorList::from_operator(ErOpt::from_config(&config.regularizer, config.line_search)?)
            }
            OpKind::Hio => OperatorList::from_operator(Hio::new(config.hio.beta)),
            OpKind::HioOpt => OperatorList::from_operator(
                HioOpt::new(config.hio_opt.alpha, state)?.with_line_search(config.line_search)?,
            ),
            OpKind::Shrink => OperatorList::from_operator(Shrink::new(
                config.shrink.threshold,
                config.shrink.sigma,
                state,
            )?),
            OpKind::Center => OperatorList::from_operator(Center::new(state)),
        };
        Ok(list)
    }
}

/// Parsed recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipe {
    Op(OpKind),
    /// Product in textual order; the last factor is applied first.
    Product(Vec<Recipe>),
    Power(Box<Recipe>, usize),
}

impl Recipe {
    /// Number of operator applications one run performs, `None` on overflow.
    pub fn applications(&self) -> Option<usize> {
        match self {
            Recipe::Op(_) => Some(1),
            Recipe::Product(factors) => factors
                .iter()
                .try_fold(0usize, |acc, f| acc.checked_add(f.applications()?)),
            Recipe::Power(inner, n) => inner.applications()?.checked_mul(*n),
        }
    }
}

impl fmt::Display for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipe::Op(kind) => f.write_str(kind.keyword()),
            Recipe::Product(factors) => {
                for (i, factor) in factors.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" * ")?;
                    }
                    match factor {
                        Recipe::Product(_) => write!(f, "({factor})")?,
                        _ => write!(f, "{factor}")?,
                    }
                }
                Ok(())
            }
            Recipe::Power(inner, n) => match inner.as_ref() {
                Recipe::Op(_) => write!(f, "{inner}^{n}"),
                _ => write!(f, "({inner})^{n}"),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Name(String),
    Int(usize),
    Star,
    Caret,
    Open,
    Close,
    End,
}

fn syntax_error(position: usize, message: impl fmt::Display) -> BcdiError {
    BcdiError::InvalidArgument(format!("recipe syntax error at position {position}: {message}"))
}

fn within_limit(count: Option<usize>, position: usize) -> BcdiResult<usize> {
    match count {
        Some(n) if n <= MAX_RECIPE_APPLICATIONS => Ok(n),
        _ => Err(syntax_error(
            position,
            format!("recipe expands to more than {MAX_RECIPE_APPLICATIONS} operator applications"),
        )),
    }
}

fn tokenize(text: &str) -> BcdiResult<Vec<(Token, usize)>> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some(&(pos, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '*' | '^' | '(' | ')' => {
                chars.next();
                let token = match c {
                    '*' => Token::Star,
                    '^' => Token::Caret,
                    '(' => Token::Open,
                    _ => Token::Close,
                };
                tokens.push((token, pos));
            }
            c if c.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    digits.push(d);
                    chars.next();
                }
                let n = digits
                    .parse::<usize>()
                    .map_err(|e| syntax_error(pos, format!("bad repeat count '{digits}': {e}")))?;
                tokens.push((Token::Int(n), pos));
            }
            c if c.is_ascii_alphabetic() => {
                let mut name = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if !d.is_ascii_alphanumeric() && d != '_' {
                        break;
                    }
                    name.push(d);
                    chars.next();
                }
                tokens.push((Token::Name(name), pos));
            }
            other => return Err(syntax_error(pos, format!("unexpected character '{other}'"))),
        }
    }
    tokens.push((Token::End, text.len()));
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    cursor: usize,
}

impl Parser {
    fn peek(&self) -> &(Token, usize) {
        // The token list always ends with `End`, which is never consumed.
        &self.tokens[self.cursor.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> (Token, usize) {
        let token = self.peek().clone();
        if token.0 != Token::End {
            self.cursor += 1;
        }
        token
    }

    fn expr(&mut self) -> BcdiResult<Recipe> {
        let start = self.peek().1;
        let first = self.term()?;
        let mut total = within_limit(first.applications(), start)?;
        let mut factors = vec![first];
        while self.peek().0 == Token::Star {
            self.advance();
            let position = self.peek().1;
            let next = self.term()?;
            total = within_limit(
                next.applications().and_then(|n| total.checked_add(n)),
                position,
            )?;
            factors.push(next);
        }
        Ok(if factors.len() == 1 {
            factors.remove(0)
        } else {
            Recipe::Product(factors)
        })
    }

    fn term(&mut self) -> BcdiResult<Recipe> {
        let base = self.factor()?;
        if self.peek().0 != Token::Caret {
            return Ok(base);
        }
        self.advance();
        match self.advance() {
            (Token::Int(n), pos) => {
                let power = Recipe::Power(Box::new(base), n);
                within_limit(power.applications(), pos)?;
                Ok(power)
            }
            (_, pos) => Err(syntax_error(pos, "expected a repeat count after '^'")),
        }
    }

    fn factor(&mut self) -> BcdiResult<Recipe> {
        match self.advance() {
            (Token::Name(name), pos) => OpKind::from_name(&name)
                .map(Recipe::Op)
                .ok_or_else(|| syntax_error(pos, format!("unknown operator '{name}'"))),
            (Token::Open, pos) => {
                let inner = self.expr()?;
                match self.advance() {
                    (Token::Close, _) => Ok(inner),
                    (_, at) => Err(syntax_error(at, format!("unclosed '(' opened at {pos}"))),
                }
            }
            (Token::End, pos) => Err(syntax_error(pos, "expected an operator")),
            (token, pos) => Err(syntax_error(pos, format!("unexpected {token:?}"))),
        }
    }
}

/// Parse a recipe string.
pub fn parse_recipe(text: &str) -> BcdiResult<Recipe> {
    let mut parser = Parser {
        tokens: tokenize(text)?,
        cursor: 0,
    };
    let recipe = parser.expr()?;
    match parser.peek() {
        (Token::End, _) => Ok(recipe),
        (token, pos) => Err(syntax_error(*pos, format!("trailing {token:?}"))),
    }
}

/// Instantiate the operators of `recipe` for `state`'s grid.
///
/// Each name in the recipe becomes one operator instance; a power shares
/// its base's instances across all repetitions. Recipes expanding to more
/// than [`MAX_RECIPE_APPLICATIONS`] applications are rejected.
pub fn build_pipeline(
    recipe: &Recipe,
    config: &ReconstructionConfig,
    state: &State<'_>,
) -> BcdiResult<OperatorList> {
    match recipe.applications() {
        Some(n) if n <= MAX_RECIPE_APPLICATIONS => build_node(recipe, config, state),
        _ => Err(BcdiError::InvalidArgument(format!(
            "recipe {recipe} expands to more than {MAX_RECIPE_APPLICATIONS} operator applications"
        ))),
    }
}

fn build_node(
    recipe: &Recipe,
    config: &ReconstructionConfig,
    state: &State<'_>,
) -> BcdiResult<OperatorList> {
    match recipe {
        Recipe::Op(kind) => kind.build(config, state),
        Recipe::Product(factors) => {
            let mut composite: Option<OperatorList> = None;
            for factor in factors {
                let next = build_node(factor, config, state)?;
                composite = Some(match composite {
                    Some(acc) => sequence(acc, next),
                    None => next,
                });
            }
            Ok(composite.unwrap_or_default())
        }
        Recipe::Power(inner, n) => Ok(repeat(build_node(inner, config, state)?, *n)),
    }
}

/// Parse `config.recipe`, build it for `state` and apply it once.
pub fn run(config: &ReconstructionConfig, state: &mut State<'_>) -> BcdiResult<()> {
    let recipe = parse_recipe(&config.recipe)?;
    let mut pipeline = build_pipeline(&recipe, config, state)?;
    info!(
        "running recipe {recipe} ({} operator applications)",
        pipeline.len()
    );
    pipeline.apply(state)?;
    info!(
        "recipe finished: loss {:.6e}, {} support voxels",
        state.loss()?,
        state.support_count()
    );
    Ok(())
}
