// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker-side selector expressions.
//!
//! Stations subscribe with a JMS-style selector over envelope properties so
//! the broker drops uninteresting traffic before it reaches the station, e.g.
//! `NOT(station_id = 101) AND mid = 2049`. The connection layer forwards the
//! expression untouched; the in-memory broker evaluates it with [`Selector`].
//!
//! # Syntax
//!
//! ```text
//! expr     ::= and ( OR and )*
//! and      ::= not ( AND not )*
//! not      ::= NOT not | primary
//! primary  ::= '(' expr ')' | operand op operand
//! op       ::= '=' | '==' | '<>' | '!=' | '<' | '<=' | '>' | '>=' | LIKE
//! operand  ::= identifier | integer | float | 'string' | TRUE | FALSE
//! ```
//!
//! Identifiers resolve to envelope properties (`mid`, `station_id`,
//! `destination_station_id`, ...) and to the header fields `subject` and
//! `creation_time`. A comparison involving a missing property is false.

mod evaluator;
mod parser;

pub use parser::{Expression, Operand, Operator};

use std::fmt;

use thiserror::Error;

use crate::message::Envelope;

/// Selector errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SelectorError {
    #[error("selector parse error at offset {offset}: {reason}")]
    Parse { offset: usize, reason: String },

    #[error("selector is empty")]
    Empty,
}

/// Parsed selector.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    source: String,
    expression: Expression,
}

impl Selector {
    /// Parse a selector expression.
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let expression = parser::parse(source)?;
        Ok(Self {
            source: source.trim().to_string(),
            expression,
        })
    }

    /// Whether `envelope` passes the selector.
    pub fn matches(&self, envelope: &Envelope) -> bool {
        evaluator::evaluate(&self.expression, envelope)
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
