//! 渲染上下文：一次渲染期间的 SQL 累积缓冲、局部作用域栈、
//! 渲染级附加绑定与 foreach 唯一序号。
//!
//! 上下文只活在单次渲染调用内，节点树本身保持只读，
//! 因此同一个 SQL 源可以被多线程并发渲染。

use indexmap::IndexMap;

use crate::config::MapperConfig;
use crate::evaluator::{EvalError, Scope};
use crate::navigator::Navigator;
use crate::value::Value;

/// 节点求值写入的渲染上下文。
#[derive(Debug)]
pub struct DynContext<'p> {
    config: &'p MapperConfig,
    param: &'p Value,
    buf: String,
    scopes: Vec<IndexMap<String, Value>>,
    extras: IndexMap<String, Value>,
    unique: u32,
}

impl<'p> DynContext<'p> {
    pub fn new(config: &'p MapperConfig, param: &'p Value) -> Self {
        Self {
            config,
            param,
            buf: String::new(),
            scopes: vec![IndexMap::new()],
            extras: IndexMap::new(),
            unique: 0,
        }
    }

    pub fn config(&self) -> &MapperConfig {
        self.config
    }

    pub fn param(&self) -> &Value {
        self.param
    }

    /// 追加一段 SQL 文本，原样拼接。
    pub fn append_sql(&mut self, part: &str) {
        self.buf.push_str(part);
    }

    /// 当前已累积 SQL 的快照，首尾空白剔除。
    pub fn sql(&self) -> String {
        self.buf.trim().to_string()
    }

    /// 结束渲染：返回整理后的 SQL 与渲染级附加绑定。
    pub fn finish(self) -> (String, IndexMap<String, Value>) {
        (self.buf.trim().to_string(), self.extras)
    }

    /// 把缓冲换成 `buf`，返回旧缓冲。trim/foreach 靠它截取子树输出。
    pub(crate) fn replace_buf(&mut self, buf: String) -> String {
        std::mem::replace(&mut self.buf, buf)
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(IndexMap::new());
    }

    pub fn pop_scope(&mut self) {
        // 根作用域不可弹出
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// 在最内层作用域登记一个名字。
    pub fn bind_local(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), value);
        }
    }

    /// 登记一个渲染级附加绑定，渲染结束后随 SQL 一起交给调用方，
    /// `#{}` 解析时优先于参数对象。
    pub fn bind_extra(&mut self, name: &str, value: Value) {
        self.extras.insert(name.to_string(), value);
    }

    pub fn extras(&self) -> &IndexMap<String, Value> {
        &self.extras
    }

    /// 本次渲染内单调递增的序号，foreach 用来区分各次迭代的合成名。
    pub fn unique_number(&mut self) -> u32 {
        let n = self.unique;
        self.unique += 1;
        n
    }

    pub fn eval_value(&self, expr: &str) -> Result<Value, EvalError> {
        self.config.evaluator.eval_value(expr, self)
    }

    pub fn eval_bool(&self, expr: &str) -> Result<bool, EvalError> {
        self.config.evaluator.eval_bool(expr, self)
    }
}

impl Scope for DynContext<'_> {
    /// 解析顺序：局部作用域（自内向外）、附加绑定、`_parameter` 整参数、
    /// 参数对象属性。map 参数缺键得 `Null`，bean 参数未声明属性是错误。
    fn lookup(&self, name: &str) -> Result<Value, EvalError> {
        for scope in self.scopes.iter().rev() {
            if let Some(v) = scope.get(name) {
                return Ok(v.clone());
            }
        }
        if let Some(v) = self.extras.get(name) {
            return Ok(v.clone());
        }
        if name == "_parameter" {
            return Ok(self.param.clone());
        }
        match self.param {
            Value::Struct(_) => Navigator::new(self.param)
                .get_value(name)
                .map_err(EvalError::from),
            Value::Map(m) => Ok(m.get(name).cloned().unwrap_or(Value::Null)),
            _ => Ok(Value::Null),
        }
    }
}
