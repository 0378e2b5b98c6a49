//! halo-sql-mapper：动态 SQL 模板引擎与属性路径导航库。
//!
//! XML 片段解析成只读节点树，针对参数对象渲染出带位置占位符的
//! SQL 与按序的绑定描述符；属性导航层在 bean / map / 序列三种
//! 形状上统一点分路径的读写。

pub mod binding;
pub mod config;
pub mod dyn_context;
pub mod evaluator;
pub mod factory;
pub mod flavor;
pub mod meta;
pub mod navigator;
pub mod nodes;
pub mod parser;
#[cfg(test)]
mod parser_tests;
pub mod prop_path;
pub mod source;
#[cfg(test)]
mod source_tests;
mod token;
pub mod value;

pub use crate::binding::{Binding, ParamMode, SyntaxError, scan_placeholders};
pub use crate::config::MapperConfig;
pub use crate::dyn_context::DynContext;
pub use crate::evaluator::{DefaultEvaluator, EvalError, ExprEvaluator, Scope};
pub use crate::factory::{DefaultObjectFactory, ObjectFactory};
pub use crate::flavor::{Flavor, default_flavor, set_default_flavor, set_default_flavor_scoped};
pub use crate::meta::{FieldMeta, FromValue, StructMeta, StructModel, StructValue};
pub use crate::navigator::{Navigator, NavigatorMut, PathError};
pub use crate::nodes::{ForEachNode, SqlNode, TrimNode};
pub use crate::parser::{BuildError, TemplateParser};
pub use crate::prop_path::PropPath;
pub use crate::source::{BoundSql, DynamicSqlSource, RawSqlSource, SqlSource, StaticSqlSource};
pub use crate::value::Value;

/// 推荐的便捷命名空间：允许 `use halo_mapper::mapper::{...}` 形式导入。
pub mod mapper {
    pub use crate::*;
}
