//! SQL 源：节点树与可执行 SQL 之间的桥。
//!
//! 动态模板每次渲染重新求值；纯静态模板构建期预渲染一次，
//! 之后取用的都是同一份成品，两种来源对调用方完全同形。

use dyn_clone::DynClone;
use indexmap::IndexMap;
use tracing::debug;

use crate::binding::{Binding, scan_placeholders};
use crate::config::MapperConfig;
use crate::dyn_context::DynContext;
use crate::evaluator::EvalError;
use crate::navigator::Navigator;
use crate::nodes::SqlNode;
use crate::parser::BuildError;
use crate::prop_path::PropPath;
use crate::value::Value;

/// 可渲染的 SQL 源。
pub trait SqlSource: DynClone + std::fmt::Debug + Send + Sync {
    /// 针对一个参数对象渲染出可执行 SQL。
    fn bound_sql(&self, parameter: &Value) -> Result<BoundSql, EvalError>;
}

dyn_clone::clone_trait_object!(SqlSource);

/// 一次渲染的结果：最终 SQL 文本、按占位符出现顺序排列的绑定
/// 描述符、渲染期登记的附加绑定（bind 变量与 foreach 合成名）。
#[derive(Debug, Clone, PartialEq)]
pub struct BoundSql {
    pub sql: String,
    pub bindings: Vec<Binding>,
    pub extras: IndexMap<String, Value>,
}

impl BoundSql {
    /// 按占位符顺序解析出参数值序列。
    ///
    /// 解析顺序：附加绑定（按属性表达式首段判定）、`_parameter`
    /// 整参数别名、标量参数整体、参数对象属性导航。map 缺键宽容
    /// 为 `Null`，bean 上未声明的属性报错并指明出错的绑定表达式。
    pub fn bind_values(&self, parameter: &Value) -> Result<Vec<Value>, EvalError> {
        let extras = Value::Map(self.extras.clone());
        let extras_nav = Navigator::new(&extras);
        let mut out = Vec::with_capacity(self.bindings.len());
        for binding in &self.bindings {
            let property = binding.property.as_str();
            let head = PropPath::new(property);
            let value = if self.extras.contains_key(head.name()) {
                extras_nav
                    .get_value(property)
                    .map_err(|cause| EvalError::UnresolvedBinding {
                        expr: property.to_string(),
                        cause,
                    })?
            } else if property == "_parameter" {
                parameter.clone()
            } else if let Some(rest) = property.strip_prefix("_parameter.") {
                resolve_parameter_property(property, rest, parameter)?
            } else {
                resolve_parameter_property(property, property, parameter)?
            };
            out.push(value);
        }
        Ok(out)
    }
}

fn resolve_parameter_property(
    expr: &str,
    path: &str,
    parameter: &Value,
) -> Result<Value, EvalError> {
    match parameter {
        Value::Null => Ok(Value::Null),
        Value::Map(_) | Value::Struct(_) | Value::Array(_) => Navigator::new(parameter)
            .get_value(path)
            .map_err(|cause| EvalError::UnresolvedBinding {
                expr: expr.to_string(),
                cause,
            }),
        // 标量参数：整个参数就是值，占位符名字不参与解析
        scalar => Ok(scalar.clone()),
    }
}

/// 动态模板：持有节点树，每次渲染重新求值并扫描占位符。
#[derive(Debug, Clone)]
pub struct DynamicSqlSource {
    config: MapperConfig,
    root: SqlNode,
}

impl DynamicSqlSource {
    pub fn new(config: MapperConfig, root: SqlNode) -> Self {
        Self { config, root }
    }
}

impl SqlSource for DynamicSqlSource {
    fn bound_sql(&self, parameter: &Value) -> Result<BoundSql, EvalError> {
        let mut ctx = DynContext::new(&self.config, parameter);
        self.root.apply(&mut ctx)?;
        let (raw, extras) = ctx.finish();
        let (sql, bindings) = scan_placeholders(&raw, self.config.flavor)?;
        debug!(sql = %sql, bindings = bindings.len(), "rendered dynamic sql");
        Ok(BoundSql { sql, bindings, extras })
    }
}

/// 纯静态模板：构建期渲染一次。
#[derive(Debug, Clone)]
pub struct RawSqlSource {
    inner: StaticSqlSource,
}

impl RawSqlSource {
    pub fn new(config: &MapperConfig, root: &SqlNode) -> Result<Self, BuildError> {
        let empty = Value::Null;
        let mut ctx = DynContext::new(config, &empty);
        root.apply(&mut ctx)?;
        let (raw, _) = ctx.finish();
        let (sql, bindings) = scan_placeholders(&raw, config.flavor)?;
        debug!(sql = %sql, "prerendered static sql");
        Ok(Self {
            inner: StaticSqlSource::new(sql, bindings),
        })
    }
}

impl SqlSource for RawSqlSource {
    fn bound_sql(&self, parameter: &Value) -> Result<BoundSql, EvalError> {
        self.inner.bound_sql(parameter)
    }
}

/// 成品 SQL 与绑定序列，渲染即复制。
#[derive(Debug, Clone, PartialEq)]
pub struct StaticSqlSource {
    pub sql: String,
    pub bindings: Vec<Binding>,
}

impl StaticSqlSource {
    pub fn new(sql: impl Into<String>, bindings: Vec<Binding>) -> Self {
        Self {
            sql: sql.into(),
            bindings,
        }
    }
}

impl SqlSource for StaticSqlSource {
    fn bound_sql(&self, _parameter: &Value) -> Result<BoundSql, EvalError> {
        Ok(BoundSql {
            sql: self.sql.clone(),
            bindings: self.bindings.clone(),
            extras: IndexMap::new(),
        })
    }
}
