//! 表达式求值：`test="..."` 谓词、`${...}` 替换与 `foreach` 集合表达式。
//!
//! 求值器是可插拔的（[`ExprEvaluator`]），默认实现 [`DefaultEvaluator`]
//! 支持字面量、属性路径（含 `[表达式]` 索引）、比较与布尔运算。
//! 解析结果按表达式文本做进程级缓存，求值本身无共享状态。

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use dyn_clone::DynClone;

use crate::navigator::{self, PathError};
use crate::value::Value;

/// 求值期错误。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("mapper expression syntax error in {expr:?} at byte {pos}: {msg}")]
    Syntax { expr: String, pos: usize, msg: &'static str },
    #[error("mapper cannot compare {lhs} with {rhs}")]
    Incomparable { lhs: &'static str, rhs: &'static str },
    #[error("mapper foreach expression {expr:?} is not iterable ({ty})")]
    NotIterable { expr: String, ty: &'static str },
    #[error("mapper unresolved binding {expr:?}: {cause}")]
    UnresolvedBinding { expr: String, cause: PathError },
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Placeholder(#[from] crate::binding::SyntaxError),
}

/// 求值时的名字解析环境：局部绑定优先于参数对象属性。
pub trait Scope {
    /// 按名解析根值；查不到的名字返回 `Null`（由上层决定容忍或报错），
    /// bean 参数上未声明的属性名是错误。
    fn lookup(&self, name: &str) -> Result<Value, EvalError>;
}

/// 可插拔的表达式求值器。
pub trait ExprEvaluator: DynClone + std::fmt::Debug + Send + Sync {
    /// 求表达式的值。
    fn eval_value(&self, expr: &str, scope: &dyn Scope) -> Result<Value, EvalError>;

    /// 求布尔谓词；非布尔结果按真值规则收缩：
    /// `Null` 为假，布尔为其本身，数值非零为真，其余非空值为真。
    fn eval_bool(&self, expr: &str, scope: &dyn Scope) -> Result<bool, EvalError>;
}

dyn_clone::clone_trait_object!(ExprEvaluator);

/// 默认求值器。
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEvaluator;

impl ExprEvaluator for DefaultEvaluator {
    fn eval_value(&self, expr: &str, scope: &dyn Scope) -> Result<Value, EvalError> {
        eval(&*parsed(expr)?, scope)
    }

    fn eval_bool(&self, expr: &str, scope: &dyn Scope) -> Result<bool, EvalError> {
        Ok(truthy(&eval(&*parsed(expr)?, scope)?))
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::I64(n) => *n != 0,
        Value::U64(n) => *n != 0,
        Value::F64(n) => *n != 0.0,
        _ => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// 路径的一步：按名取属性，或按子表达式的值做索引。
#[derive(Debug, Clone, PartialEq)]
enum Step {
    Prop(String),
    Index(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Lit(Value),
    Path(Vec<Step>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
}

static EXPR_CACHE: OnceLock<Mutex<HashMap<String, Arc<Expr>>>> = OnceLock::new();

/// 解析表达式，命中缓存时直接复用（解析是纯函数，竞态重复解析无害）。
fn parsed(expr: &str) -> Result<Arc<Expr>, EvalError> {
    let cache = EXPR_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    {
        let g = cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(hit) = g.get(expr) {
            return Ok(hit.clone());
        }
    }
    let ast = Arc::new(Parser::new(expr).parse()?);
    let mut g = cache.lock().unwrap_or_else(|e| e.into_inner());
    g.insert(expr.to_string(), ast.clone());
    Ok(ast)
}

fn eval(expr: &Expr, scope: &dyn Scope) -> Result<Value, EvalError> {
    match expr {
        Expr::Lit(v) => Ok(v.clone()),
        Expr::Path(steps) => resolve_path(steps, scope),
        Expr::Not(e) => Ok(Value::Bool(!truthy(&eval(e, scope)?))),
        Expr::And(l, r) => {
            if !truthy(&eval(l, scope)?) {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(truthy(&eval(r, scope)?)))
        }
        Expr::Or(l, r) => {
            if truthy(&eval(l, scope)?) {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(truthy(&eval(r, scope)?)))
        }
        Expr::Cmp(op, l, r) => {
            let l = eval(l, scope)?;
            let r = eval(r, scope)?;
            compare(*op, &l, &r).map(Value::Bool)
        }
    }
}

fn resolve_path(steps: &[Step], scope: &dyn Scope) -> Result<Value, EvalError> {
    let mut it = steps.iter();
    let mut cur = match it.next() {
        Some(Step::Prop(name)) => scope.lookup(name)?,
        _ => return Ok(Value::Null),
    };
    for step in it {
        if cur.is_null() {
            return Ok(Value::Null);
        }
        cur = match step {
            Step::Prop(name) => {
                navigator::prop_step(&cur, name)?.cloned().unwrap_or(Value::Null)
            }
            Step::Index(e) => {
                let idx = eval(e, scope)?;
                let key = match idx {
                    Value::String(s) => s.into_owned(),
                    other => other.to_text(),
                };
                navigator::index_step(&cur, &key, &key)?.cloned().unwrap_or(Value::Null)
            }
        };
    }
    Ok(cur)
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::I64(n) => Some(*n as f64),
        Value::U64(n) => Some(*n as f64),
        Value::F64(n) => Some(*n),
        _ => None,
    }
}

fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::I64(a), Value::U64(b)) => i128::from(*a) == i128::from(*b),
        (Value::U64(a), Value::I64(b)) => i128::from(*a) == i128::from(*b),
        _ => match (as_f64(l), as_f64(r)) {
            (Some(a), Some(b)) if l.type_name() != r.type_name() => a == b,
            _ => l == r,
        },
    }
}

fn compare(op: CmpOp, l: &Value, r: &Value) -> Result<bool, EvalError> {
    match op {
        CmpOp::Eq => return Ok(values_equal(l, r)),
        CmpOp::Ne => return Ok(!values_equal(l, r)),
        _ => {}
    }
    let ord = match (l, r) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
        _ => match (as_f64(l), as_f64(r)) {
            (Some(a), Some(b)) => a
                .partial_cmp(&b)
                .ok_or(EvalError::Incomparable { lhs: l.type_name(), rhs: r.type_name() })?,
            _ => {
                return Err(EvalError::Incomparable { lhs: l.type_name(), rhs: r.type_name() });
            }
        },
    };
    Ok(match op {
        CmpOp::Lt => ord.is_lt(),
        CmpOp::Le => ord.is_le(),
        CmpOp::Gt => ord.is_gt(),
        CmpOp::Ge => ord.is_ge(),
        CmpOp::Eq | CmpOp::Ne => unreachable!(),
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Num(Value),
    Str(String),
    Op(CmpOp),
    AndAnd,
    OrOr,
    Bang,
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
}

struct Parser<'e> {
    expr: &'e str,
    toks: Vec<(usize, Tok)>,
    pos: usize,
}

impl<'e> Parser<'e> {
    fn new(expr: &'e str) -> Self {
        Self { expr, toks: Vec::new(), pos: 0 }
    }

    fn err(&self, pos: usize, msg: &'static str) -> EvalError {
        EvalError::Syntax { expr: self.expr.to_string(), pos, msg }
    }

    fn lex(&mut self) -> Result<(), EvalError> {
        let bytes = self.expr.as_bytes();
        let mut i = 0usize;
        while i < bytes.len() {
            let b = bytes[i];
            match b {
                b' ' | b'\t' | b'\r' | b'\n' => i += 1,
                b'(' => {
                    self.toks.push((i, Tok::LParen));
                    i += 1;
                }
                b')' => {
                    self.toks.push((i, Tok::RParen));
                    i += 1;
                }
                b'[' => {
                    self.toks.push((i, Tok::LBracket));
                    i += 1;
                }
                b']' => {
                    self.toks.push((i, Tok::RBracket));
                    i += 1;
                }
                b'.' => {
                    self.toks.push((i, Tok::Dot));
                    i += 1;
                }
                b'=' => {
                    if bytes.get(i + 1) == Some(&b'=') {
                        self.toks.push((i, Tok::Op(CmpOp::Eq)));
                        i += 2;
                    } else {
                        return Err(self.err(i, "single = is not an operator"));
                    }
                }
                b'!' => {
                    if bytes.get(i + 1) == Some(&b'=') {
                        self.toks.push((i, Tok::Op(CmpOp::Ne)));
                        i += 2;
                    } else {
                        self.toks.push((i, Tok::Bang));
                        i += 1;
                    }
                }
                b'<' => {
                    if bytes.get(i + 1) == Some(&b'=') {
                        self.toks.push((i, Tok::Op(CmpOp::Le)));
                        i += 2;
                    } else {
                        self.toks.push((i, Tok::Op(CmpOp::Lt)));
                        i += 1;
                    }
                }
                b'>' => {
                    if bytes.get(i + 1) == Some(&b'=') {
                        self.toks.push((i, Tok::Op(CmpOp::Ge)));
                        i += 2;
                    } else {
                        self.toks.push((i, Tok::Op(CmpOp::Gt)));
                        i += 1;
                    }
                }
                b'&' => {
                    if bytes.get(i + 1) == Some(&b'&') {
                        self.toks.push((i, Tok::AndAnd));
                        i += 2;
                    } else {
                        return Err(self.err(i, "single & is not an operator"));
                    }
                }
                b'|' => {
                    if bytes.get(i + 1) == Some(&b'|') {
                        self.toks.push((i, Tok::OrOr));
                        i += 2;
                    } else {
                        return Err(self.err(i, "single | is not an operator"));
                    }
                }
                b'\'' | b'"' => {
                    let quote = b;
                    let start = i + 1;
                    let mut j = start;
                    while j < bytes.len() && bytes[j] != quote {
                        j += 1;
                    }
                    if j >= bytes.len() {
                        return Err(self.err(i, "unterminated string literal"));
                    }
                    self.toks.push((i, Tok::Str(self.expr[start..j].to_string())));
                    i = j + 1;
                }
                b'-' | b'0'..=b'9' => {
                    if b == b'-' && !bytes.get(i + 1).is_some_and(u8::is_ascii_digit) {
                        return Err(self.err(i, "minus must start a number"));
                    }
                    let start = i;
                    i += 1;
                    let mut is_float = false;
                    while i < bytes.len()
                        && (bytes[i].is_ascii_digit() || (bytes[i] == b'.' && !is_float))
                    {
                        // 点号后面必须还是数字，否则它属于路径
                        if bytes[i] == b'.' {
                            if !bytes.get(i + 1).is_some_and(u8::is_ascii_digit) {
                                break;
                            }
                            is_float = true;
                        }
                        i += 1;
                    }
                    let text = &self.expr[start..i];
                    let num = if is_float {
                        text.parse::<f64>().ok().map(Value::F64)
                    } else {
                        text.parse::<i64>().ok().map(Value::I64)
                    };
                    match num {
                        Some(v) => self.toks.push((start, Tok::Num(v))),
                        None => return Err(self.err(start, "malformed number literal")),
                    }
                }
                b'A'..=b'Z' | b'a'..=b'z' | b'_' => {
                    let start = i;
                    while i < bytes.len()
                        && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_')
                    {
                        i += 1;
                    }
                    self.toks.push((start, Tok::Ident(self.expr[start..i].to_string())));
                }
                _ => return Err(self.err(i, "unexpected character")),
            }
        }
        Ok(())
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos).map(|(_, t)| t)
    }

    fn bump(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.pos).map(|(_, t)| t.clone());
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn here(&self) -> usize {
        self.toks.get(self.pos).map(|(p, _)| *p).unwrap_or(self.expr.len())
    }

    fn parse(mut self) -> Result<Expr, EvalError> {
        self.lex()?;
        let e = self.parse_or()?;
        if self.pos != self.toks.len() {
            return Err(self.err(self.here(), "trailing tokens after expression"));
        }
        Ok(e)
    }

    fn parse_or(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_and()?;
        loop {
            let is_or = match self.peek() {
                Some(Tok::OrOr) => true,
                Some(Tok::Ident(w)) if w == "or" => true,
                _ => false,
            };
            if !is_or {
                return Ok(lhs);
            }
            self.bump();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_and(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_not()?;
        loop {
            let is_and = match self.peek() {
                Some(Tok::AndAnd) => true,
                Some(Tok::Ident(w)) if w == "and" => true,
                _ => false,
            };
            if !is_and {
                return Ok(lhs);
            }
            self.bump();
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_not(&mut self) -> Result<Expr, EvalError> {
        let is_not = match self.peek() {
            Some(Tok::Bang) => true,
            Some(Tok::Ident(w)) if w == "not" => true,
            _ => false,
        };
        if is_not {
            self.bump();
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<Expr, EvalError> {
        let lhs = self.parse_primary()?;
        let op = match self.peek() {
            Some(Tok::Op(op)) => *op,
            Some(Tok::Ident(w)) => match w.as_str() {
                "eq" => CmpOp::Eq,
                "neq" => CmpOp::Ne,
                "lt" => CmpOp::Lt,
                "lte" => CmpOp::Le,
                "gt" => CmpOp::Gt,
                "gte" => CmpOp::Ge,
                _ => return Ok(lhs),
            },
            _ => return Ok(lhs),
        };
        self.bump();
        let rhs = self.parse_primary()?;
        Ok(Expr::Cmp(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        let pos = self.here();
        match self.bump() {
            Some(Tok::LParen) => {
                let e = self.parse_or()?;
                match self.bump() {
                    Some(Tok::RParen) => Ok(e),
                    _ => Err(self.err(self.here(), "missing closing parenthesis")),
                }
            }
            Some(Tok::Num(v)) => Ok(Expr::Lit(v)),
            Some(Tok::Str(s)) => Ok(Expr::Lit(Value::String(Cow::Owned(s)))),
            Some(Tok::Ident(w)) => match w.as_str() {
                "null" => Ok(Expr::Lit(Value::Null)),
                "true" => Ok(Expr::Lit(Value::Bool(true))),
                "false" => Ok(Expr::Lit(Value::Bool(false))),
                _ => self.parse_path(w),
            },
            _ => Err(self.err(pos, "expected a value, path or parenthesized expression")),
        }
    }

    fn parse_path(&mut self, first: String) -> Result<Expr, EvalError> {
        let mut steps = vec![Step::Prop(first)];
        loop {
            match self.peek() {
                Some(Tok::Dot) => {
                    self.bump();
                    match self.bump() {
                        Some(Tok::Ident(name)) => steps.push(Step::Prop(name)),
                        _ => return Err(self.err(self.here(), "expected property name after .")),
                    }
                }
                Some(Tok::LBracket) => {
                    self.bump();
                    let idx = self.parse_or()?;
                    match self.bump() {
                        Some(Tok::RBracket) => steps.push(Step::Index(Box::new(idx))),
                        _ => return Err(self.err(self.here(), "missing closing bracket")),
                    }
                }
                _ => return Ok(Expr::Path(steps)),
            }
        }
    }
}
