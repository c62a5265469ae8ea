use regex::Regex;
use smallvec::SmallVec;
use std::{fmt, sync::OnceLock};

use crate::error::{Result, WorkloadError};
use crate::ids::{LayerDim, LayerOperand, OperandRole};

/// One operand of an equation together with its indexing dimensions, in textual order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperandTerm {
    pub operand: LayerOperand,
    pub role: OperandRole,
    pub dims: SmallVec<[LayerDim; 6]>,
}

/// Normalized equation, e.g. `O[k][ox] = W[k][c] * I[c][ox]`.
/// The first term is the output, the remaining terms are inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Equation {
    text: String,
    terms: SmallVec<[OperandTerm; 3]>,
}

// split an equation into identifier and separator tokens
fn tokens(equation: &str) -> Vec<&str> {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    let token = TOKEN.get_or_init(|| Regex::new(r"[A-Za-z0-9_]+|[=*+]").unwrap());
    let mut out: Vec<&str> = Vec::new();
    for tok in token.find_iter(equation).map(|m| m.as_str()) {
        // `+=` and `++` collapse onto the second symbol, so accumulation and concatenation
        // forms split like plain assignment and addition
        if (tok == "=" || tok == "+") && out.last() == Some(&"+") { out.pop(); }
        out.push(tok);
    }
    out
}

fn is_separator(tok: &str) -> bool { matches!(tok, "=" | "*" | "+") }

impl Equation {
    pub fn parse(equation: &str) -> Result<Self> {
        let malformed = || WorkloadError::MalformedEquation(equation.to_owned());
        let toks = tokens(equation);
        if toks.iter().filter(|t| **t == "=").count() != 1 { Err(malformed())? }
        let mut terms: SmallVec<[OperandTerm; 3]> = SmallVec::new();
        for (i, segment) in toks.split(|t| is_separator(t)).enumerate() {
            let Some((operand, dims)) = segment.split_first() else { return Err(malformed()) };
            terms.push(OperandTerm {
                operand: LayerOperand::new(operand),
                role: if i == 0 { OperandRole::Output } else { OperandRole::Input },
                dims: dims.iter().map(|d| LayerDim::new(d)).collect(),
            });
        }
        if terms.len() < 2 { Err(malformed())? }
        let mut seps = toks.iter().filter(|t| is_separator(t));
        let mut text = String::new();
        for (i, term) in terms.iter().enumerate() {
            if i != 0 { text.push_str(&format!(" {} ", seps.next().unwrap_or(&"*"))); }
            text.push_str(term.operand.as_str());
            for d in &term.dims { text.push_str(&format!("[{}]", d.as_str().to_lowercase())); }
        }
        Ok(Equation { text, terms })
    }

    pub fn terms(&self) -> &[OperandTerm] { &self.terms }

    pub fn output(&self) -> &OperandTerm { &self.terms[0] }

    pub fn inputs(&self) -> &[OperandTerm] { &self.terms[1..] }

    pub fn term(&self, operand: &LayerOperand) -> Option<&OperandTerm> {
        self.terms.iter().find(|t| &t.operand == operand)
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
