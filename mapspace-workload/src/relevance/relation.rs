use regex::Regex;
use smallvec::SmallVec;
use std::{fmt, sync::OnceLock};

use crate::error::{Result, WorkloadError};
use crate::ids::LayerDim;

/// Affine relation `dim = coef[0]*generators[0] + coef[1]*generators[1]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DimRelation {
    pub dim: LayerDim,
    pub generators: [LayerDim; 2],
    pub scaling: [u32; 2],
}

// tokens of a relation, in order
#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok<'s> {
    Name(&'s str),
    Num(&'s str),
    Sym(char),
}

fn tokens(relation: &str) -> Result<SmallVec<[Tok<'_>; 12]>> {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    let token = TOKEN.get_or_init(|| Regex::new(r"[A-Za-z]+|[0-9]+|[=*+\-]|\S").unwrap());
    token.find_iter(relation).map(|m| {
        let s = m.as_str();
        match s.as_bytes()[0] {
            b'A'..=b'Z' | b'a'..=b'z' => Ok(Tok::Name(s)),
            b'0'..=b'9' => Ok(Tok::Num(s)),
            b'=' | b'*' | b'+' | b'-' => Ok(Tok::Sym(s.as_bytes()[0] as char)),
            _ => Err(WorkloadError::MalformedRelation {
                relation: relation.to_owned(), reason: "unexpected character",
            }),
        }
    }).collect()
}

impl DimRelation {
    /// Parse relations such as `ix = ox + fx` or `iy=2*oy+fy`.
    pub fn parse(relation: &str) -> Result<Self> {
        let toks = tokens(relation)?;
        let malformed = |reason| WorkloadError::MalformedRelation { relation: relation.to_owned(), reason };
        // exactly three dimension names: one target, two generators
        let names = toks.iter().filter(|t| matches!(t, Tok::Name(_))).count();
        if names != 3 {
            Err(WorkloadError::GeneratorCount { relation: relation.to_owned(), found: names.saturating_sub(1) })?
        }
        let (Some(Tok::Name(dim)), Some(Tok::Sym('='))) = (toks.first(), toks.get(1)) else {
            return Err(malformed("expected `<dim> =` on the left-hand side"));
        };
        if toks.iter().filter(|t| **t == Tok::Sym('=')).count() != 1 {
            Err(malformed("expected a single `=`"))?
        }
        let mut generators: SmallVec<[(LayerDim, u32); 2]> = SmallVec::new();
        for term in toks[2..].split(|t| *t == Tok::Sym('+')) {
            let (coef, name) = match term {
                [Tok::Name(n)] => (1, *n),
                [Tok::Num(c), Tok::Sym('*'), Tok::Name(n)] => {
                    let c = c.parse::<u32>().map_err(|_| malformed("coefficient out of range"))?;
                    if c == 0 { Err(WorkloadError::Arithmetic("zero scaling factor"))? }
                    (c, *n)
                }
                [Tok::Sym('*'), Tok::Name(n)] | [Tok::Name(_), Tok::Sym('*'), Tok::Name(n)] =>
                    Err(WorkloadError::MissingScalingFactor { relation: relation.to_owned(), dim: n.to_uppercase() })?,
                [] => Err(malformed("empty term"))?,
                _ if term.iter().any(|t| matches!(t, Tok::Num(_) | Tok::Sym('-'))) =>
                    Err(WorkloadError::ConstantInRelation { relation: relation.to_owned() })?,
                _ => Err(malformed("unexpected term"))?,
            };
            generators.push((LayerDim::new(name), coef));
        }
        let [(g0, c0), (g1, c1)]: [(LayerDim, u32); 2] = generators.into_inner()
            .map_err(|_| malformed("expected two terms"))?;
        if g0 == g1 { Err(malformed("generators must be distinct"))? }
        Ok(DimRelation { dim: LayerDim::new(dim), generators: [g0, g1], scaling: [c0, c1] })
    }
}

impl fmt::Display for DimRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [g0, g1] = &self.generators;
        let [c0, c1] = self.scaling;
        write!(f, "{} = {c0}*{g0} + {c1}*{g1}", self.dim)
    }
}
