//! 对象工厂：写路径途中遇到 `Null` 中间段时实例化默认值。

use dyn_clone::DynClone;

use crate::meta::{FieldMeta, StructValue};
use crate::navigator::PathError;
use crate::value::Value;

/// 可注入的默认实例化策略。
///
/// `field` 为待实例化段的字段描述；`None` 表示宿主是 map 形状
/// （无声明类型），此时按惯例给一个空 map。
pub trait ObjectFactory: DynClone + std::fmt::Debug + Send + Sync {
    fn create(&self, field: Option<&FieldMeta>) -> Result<Value, PathError>;
}

dyn_clone::clone_trait_object!(ObjectFactory);

/// 默认策略：嵌套记录给全 `Null` 字段的实例，`Vec<..>` 给空序列，
/// map 类型给空 map；标量没有可用的默认中间值，报错。
#[derive(Debug, Clone, Default)]
pub struct DefaultObjectFactory;

impl ObjectFactory for DefaultObjectFactory {
    fn create(&self, field: Option<&FieldMeta>) -> Result<Value, PathError> {
        let Some(field) = field else {
            return Ok(Value::Map(indexmap::IndexMap::new()));
        };
        if let Some(meta) = field.nested {
            return Ok(Value::Struct(StructValue::empty(meta)));
        }
        if field.ty.starts_with("Vec<") || field.ty == "Vec" {
            return Ok(Value::Array(Vec::new()));
        }
        if field.ty.contains("Map") {
            return Ok(Value::Map(indexmap::IndexMap::new()));
        }
        Err(PathError::CannotInstantiate { ty: field.ty.to_string() })
    }
}
