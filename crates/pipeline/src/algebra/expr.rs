//! Textual band-expression evaluator
//!
//! Parses arithmetic/comparison/boolean formulas referencing named
//! operands and evaluates them per pixel over aligned bands:
//!
//! - `"(nir - red) / (nir + red)"` → NDVI
//! - `"1.5 * ((nir - red) / (nir + red + 0.5))"` → SAVI
//! - `"mndwi > 0 && slope < 5"` → boolean (1/0) water-on-flat-ground
//!
//! Comparisons and boolean combinators yield 1.0/0.0. No-data in any
//! referenced operand makes the output pixel no-data, and division by
//! zero resolves to no-data rather than raising.

use marisma_core::{Band, Error, Raster, Result};
use ndarray::Array2;
use rayon::prelude::*;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    AndAnd,
    OrOr,
    Bang,
    LParen,
    RParen,
}

#[derive(Debug, Clone)]
enum Node {
    Num(f64),
    Operand(usize),
    Add(Box<Node>, Box<Node>),
    Sub(Box<Node>, Box<Node>),
    Mul(Box<Node>, Box<Node>),
    Div(Box<Node>, Box<Node>),
    Pow(Box<Node>, Box<Node>),
    Cmp(CmpKind, Box<Node>, Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Not(Box<Node>),
    Neg(Box<Node>),
}

#[derive(Debug, Clone, Copy)]
enum CmpKind {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

fn tokenize(formula: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = formula.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '^' => {
                tokens.push(Token::Caret);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return Err(Error::Expression(
                        "single '=' is not an operator; use '=='".to_string(),
                    ));
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    tokens.push(Token::Bang);
                    i += 1;
                }
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token::AndAnd);
                    i += 2;
                } else {
                    return Err(Error::Expression("single '&' is not an operator".to_string()));
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::OrOr);
                    i += 2;
                } else {
                    return Err(Error::Expression("single '|' is not an operator".to_string()));
                }
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| Error::Expression(format!("invalid number '{}'", text)))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(Error::Expression(format!(
                    "unexpected character '{}' in formula",
                    other
                )))
            }
        }
    }

    Ok(tokens)
}

/// Recursive descent parser; precedence low to high:
/// `||`, `&&`, comparisons, `+ -`, `* /`, unary `- !`, `^` (right-assoc).
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    operands: Vec<String>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            operands: Vec::new(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn operand_index(&mut self, name: String) -> usize {
        if let Some(idx) = self.operands.iter().position(|n| *n == name) {
            idx
        } else {
            self.operands.push(name);
            self.operands.len() - 1
        }
    }

    fn parse_or(&mut self) -> Result<Node> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::OrOr) {
            self.advance();
            let right = self.parse_and()?;
            left = Node::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Node> {
        let mut left = self.parse_cmp()?;
        while self.peek() == Some(&Token::AndAnd) {
            self.advance();
            let right = self.parse_cmp()?;
            left = Node::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_cmp(&mut self) -> Result<Node> {
        let left = self.parse_add()?;
        let kind = match self.peek() {
            Some(Token::Lt) => CmpKind::Lt,
            Some(Token::Le) => CmpKind::Le,
            Some(Token::Gt) => CmpKind::Gt,
            Some(Token::Ge) => CmpKind::Ge,
            Some(Token::EqEq) => CmpKind::Eq,
            Some(Token::Ne) => CmpKind::Ne,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_add()?;
        Ok(Node::Cmp(kind, Box::new(left), Box::new(right)))
    }

    fn parse_add(&mut self) -> Result<Node> {
        let mut left = self.parse_mul()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.advance();
                    left = Node::Add(Box::new(left), Box::new(self.parse_mul()?));
                }
                Some(Token::Minus) => {
                    self.advance();
                    left = Node::Sub(Box::new(left), Box::new(self.parse_mul()?));
                }
                _ => return Ok(left),
            }
        }
    }

    fn parse_mul(&mut self) -> Result<Node> {
        let mut left = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.advance();
                    left = Node::Mul(Box::new(left), Box::new(self.parse_unary()?));
                }
                Some(Token::Slash) => {
                    self.advance();
                    left = Node::Div(Box::new(left), Box::new(self.parse_unary()?));
                }
                _ => return Ok(left),
            }
        }
    }

    fn parse_unary(&mut self) -> Result<Node> {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                Ok(Node::Neg(Box::new(self.parse_unary()?)))
            }
            Some(Token::Bang) => {
                self.advance();
                Ok(Node::Not(Box::new(self.parse_unary()?)))
            }
            Some(Token::Plus) => {
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_pow(),
        }
    }

    fn parse_pow(&mut self) -> Result<Node> {
        let base = self.parse_atom()?;
        if self.peek() == Some(&Token::Caret) {
            self.advance();
            // right-associative: 2^3^2 = 2^(3^2)
            let exponent = self.parse_unary()?;
            return Ok(Node::Pow(Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_atom(&mut self) -> Result<Node> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Node::Num(n)),
            Some(Token::Ident(name)) => {
                let idx = self.operand_index(name);
                Ok(Node::Operand(idx))
            }
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(Error::Expression("expected closing parenthesis".to_string())),
                }
            }
            other => Err(Error::Expression(format!(
                "unexpected token in formula: {:?}",
                other
            ))),
        }
    }
}

fn eval(node: &Node, values: &[f64]) -> f64 {
    match node {
        Node::Num(n) => *n,
        Node::Operand(idx) => values[*idx],
        Node::Add(l, r) => eval(l, values) + eval(r, values),
        Node::Sub(l, r) => eval(l, values) - eval(r, values),
        Node::Mul(l, r) => eval(l, values) * eval(r, values),
        Node::Div(l, r) => {
            let denom = eval(r, values);
            if denom.abs() < 1e-10 {
                f64::NAN
            } else {
                eval(l, values) / denom
            }
        }
        Node::Pow(l, r) => eval(l, values).powf(eval(r, values)),
        Node::Cmp(kind, l, r) => {
            let (a, b) = (eval(l, values), eval(r, values));
            if a.is_nan() || b.is_nan() {
                return f64::NAN;
            }
            let holds = match kind {
                CmpKind::Lt => a < b,
                CmpKind::Le => a <= b,
                CmpKind::Gt => a > b,
                CmpKind::Ge => a >= b,
                CmpKind::Eq => a == b,
                CmpKind::Ne => a != b,
            };
            if holds {
                1.0
            } else {
                0.0
            }
        }
        Node::And(l, r) => {
            let (a, b) = (eval(l, values), eval(r, values));
            if a.is_nan() || b.is_nan() {
                return f64::NAN;
            }
            if a != 0.0 && b != 0.0 {
                1.0
            } else {
                0.0
            }
        }
        Node::Or(l, r) => {
            let (a, b) = (eval(l, values), eval(r, values));
            if a.is_nan() || b.is_nan() {
                return f64::NAN;
            }
            if a != 0.0 || b != 0.0 {
                1.0
            } else {
                0.0
            }
        }
        Node::Not(inner) => {
            let v = eval(inner, values);
            if v.is_nan() {
                f64::NAN
            } else if v == 0.0 {
                1.0
            } else {
                0.0
            }
        }
        Node::Neg(inner) => -eval(inner, values),
    }
}

/// A parsed band expression.
///
/// Parse once, evaluate over any set of aligned operand bands. The set
/// of referenced operand names is fixed at parse time and checked
/// against the supplied bands before any pixel is touched.
#[derive(Debug, Clone)]
pub struct Expression {
    ast: Node,
    operands: Vec<String>,
    source: String,
}

impl Expression {
    pub fn parse(formula: &str) -> Result<Self> {
        let tokens = tokenize(formula)?;
        if tokens.is_empty() {
            return Err(Error::Expression("empty formula".to_string()));
        }
        let mut parser = Parser::new(tokens);
        let ast = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(Error::Expression(format!(
                "trailing tokens after position {} in '{}'",
                parser.pos, formula
            )));
        }
        Ok(Self {
            ast,
            operands: parser.operands,
            source: formula.to_string(),
        })
    }

    /// Operand names referenced by the formula, in first-use order
    pub fn operands(&self) -> &[String] {
        &self.operands
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate over named operand bands.
    ///
    /// Every referenced operand must be supplied (missing ones fail fast
    /// with the available names, before evaluation) and all bands must
    /// share one shape. Output band is named after the formula's first
    /// operand unless there is none, then `"expr"`.
    pub fn evaluate(&self, bands: &[(&str, &Band)]) -> Result<Band> {
        let mut resolved: Vec<&Band> = Vec::with_capacity(self.operands.len());
        for name in &self.operands {
            let band = bands
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, b)| *b)
                .ok_or_else(|| Error::BandNotFound {
                    band: name.clone(),
                    available: bands.iter().map(|(n, _)| n.to_string()).collect(),
                })?;
            resolved.push(band);
        }

        let (rows, cols) = resolved
            .first()
            .map(|b| b.shape())
            .or_else(|| bands.first().map(|(_, b)| b.shape()))
            .ok_or_else(|| Error::Expression("no operand bands supplied".to_string()))?;
        for band in &resolved {
            if band.shape() != (rows, cols) {
                let (ar, ac) = band.shape();
                return Err(Error::SizeMismatch {
                    er: rows,
                    ec: cols,
                    ar,
                    ac,
                });
            }
        }

        let ast = &self.ast;
        let data: Vec<f64> = (0..rows)
            .into_par_iter()
            .flat_map(|row| {
                let mut row_data = vec![f64::NAN; cols];
                let mut values = vec![0.0f64; resolved.len()];
                'pixels: for (col, out) in row_data.iter_mut().enumerate() {
                    for (slot, band) in values.iter_mut().zip(&resolved) {
                        let v = unsafe { band.get_unchecked(row, col) };
                        if v.is_nan() {
                            continue 'pixels;
                        }
                        *slot = v;
                    }
                    *out = eval(ast, &values);
                }
                row_data
            })
            .collect();

        let name = self
            .operands
            .first()
            .cloned()
            .unwrap_or_else(|| "expr".to_string());
        let array =
            Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
        Ok(Band::new(name, array))
    }

    /// Evaluate against a raster, binding operand names to band names.
    ///
    /// With no bindings, operand names are used as band names directly.
    pub fn evaluate_on(&self, raster: &Raster, bindings: &[(&str, &str)]) -> Result<Band> {
        let mut bands: Vec<(&str, &Band)> = Vec::with_capacity(self.operands.len());
        for operand in &self.operands {
            let band_name = bindings
                .iter()
                .find(|(op, _)| op == operand)
                .map(|(_, band)| *band)
                .unwrap_or(operand.as_str());
            bands.push((operand.as_str(), raster.band(band_name)?));
        }
        self.evaluate(&bands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(name: &str, value: f64) -> Band {
        Band::filled(name, 2, 2, value)
    }

    #[test]
    fn ndvi_formula() {
        let expr = Expression::parse("(nir - red) / (nir + red)").unwrap();
        assert_eq!(expr.operands(), &["nir", "red"]);
        let nir = band("nir", 0.8);
        let red = band("red", 0.2);
        let out = expr.evaluate(&[("nir", &nir), ("red", &red)]).unwrap();
        assert!((out.get(0, 0).unwrap() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn savi_style_constants() {
        let expr = Expression::parse("1.5 * ((nir - red) / (nir + red + 0.5))").unwrap();
        let nir = band("nir", 0.5);
        let red = band("red", 0.1);
        let out = expr.evaluate(&[("nir", &nir), ("red", &red)]).unwrap();
        let expected = 1.5 * ((0.5 - 0.1) / (0.5 + 0.1 + 0.5));
        assert!((out.get(1, 1).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn power_is_right_associative() {
        let expr = Expression::parse("2 ^ 3 ^ 2").unwrap();
        let dummy = band("x", 0.0);
        // needs at least one band for the grid; bind an unused name
        let expr_with_band = Expression::parse("x * 0 + 2 ^ 3 ^ 2").unwrap();
        let out = expr_with_band.evaluate(&[("x", &dummy)]).unwrap();
        assert_eq!(out.get(0, 0).unwrap(), 512.0);
        assert!(expr.operands().is_empty());
    }

    #[test]
    fn comparison_and_boolean() {
        let expr = Expression::parse("mndwi > 0 && slope < 5").unwrap();
        let mndwi = band("mndwi", 0.3);
        let slope = band("slope", 2.0);
        let out = expr
            .evaluate(&[("mndwi", &mndwi), ("slope", &slope)])
            .unwrap();
        assert_eq!(out.get(0, 0).unwrap(), 1.0);

        let steep = band("slope", 12.0);
        let out = expr
            .evaluate(&[("mndwi", &mndwi), ("slope", &steep)])
            .unwrap();
        assert_eq!(out.get(0, 0).unwrap(), 0.0);
    }

    #[test]
    fn not_operator() {
        let expr = Expression::parse("!(qa > 0)").unwrap();
        let qa = band("qa", 0.0);
        let out = expr.evaluate(&[("qa", &qa)]).unwrap();
        assert_eq!(out.get(0, 0).unwrap(), 1.0);
    }

    #[test]
    fn missing_operand_fails_before_evaluation() {
        let expr = Expression::parse("(nir - red) / (nir + red)").unwrap();
        let nir = band("nir", 0.8);
        let err = expr.evaluate(&[("nir", &nir)]).unwrap_err();
        assert!(matches!(err, Error::BandNotFound { .. }));
    }

    #[test]
    fn nodata_propagates() {
        let expr = Expression::parse("a + b").unwrap();
        let mut a = band("a", 1.0);
        a.set(0, 1, f64::NAN).unwrap();
        let b = band("b", 2.0);
        let out = expr.evaluate(&[("a", &a), ("b", &b)]).unwrap();
        assert_eq!(out.get(0, 0).unwrap(), 3.0);
        assert!(out.get(0, 1).unwrap().is_nan());
    }

    #[test]
    fn division_by_zero_is_nodata() {
        let expr = Expression::parse("a / b").unwrap();
        let a = band("a", 1.0);
        let b = band("b", 0.0);
        let out = expr.evaluate(&[("a", &a), ("b", &b)]).unwrap();
        assert!(out.get(0, 0).unwrap().is_nan());
    }

    #[test]
    fn parse_errors() {
        assert!(Expression::parse("(nir - ").is_err());
        assert!(Expression::parse("a = b").is_err());
        assert!(Expression::parse("a & b").is_err());
        assert!(Expression::parse("").is_err());
        assert!(Expression::parse("a b").is_err());
    }

    #[test]
    fn evaluate_on_raster_with_bindings() {
        let raster = Raster::from_bands(
            vec![Band::filled("B8", 3, 3, 0.6), Band::filled("B4", 3, 3, 0.2)],
            marisma_core::PixelTransform::default(),
        )
        .unwrap();
        let expr = Expression::parse("(nir - red) / (nir + red)").unwrap();
        let out = expr
            .evaluate_on(&raster, &[("nir", "B8"), ("red", "B4")])
            .unwrap();
        assert!((out.get(1, 1).unwrap() - 0.5).abs() < 1e-12);
    }
}
