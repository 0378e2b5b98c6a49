//! 结构体元数据：记录形状（bean）的静态字段描述与双向取值。
//!
//! Rust 无运行时反射；在不引入 proc-macro crate 的前提下，本模块通过
//! `macro_rules!` 为业务 struct 生成字段元数据（[`StructMeta`]）与
//! [`Value`] 双向转换，供属性导航层按名读写字段。

use crate::value::Value;

/// 单个字段的静态描述。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldMeta {
    /// 字段名（导航键）。
    pub name: &'static str,
    /// 声明类型名（类型描述符，不参与求值）。
    pub ty: &'static str,
    /// 序列字段的元素类型名（`Vec<T>` 的 `T`），用于索引访问的类型推导。
    pub elem: Option<&'static str>,
    /// 嵌套记录的元数据，写路径途中实例化默认值时使用。
    pub nested: Option<&'static StructMeta>,
    /// 是否可读。
    pub get: bool,
    /// 是否可写。
    pub set: bool,
}

/// 记录形状的静态描述。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StructMeta {
    pub name: &'static str,
    pub fields: &'static [FieldMeta],
}

impl StructMeta {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// 大小写不敏感匹配：`folded` 为调用方已折叠（小写、可能去过下划线）
    /// 的查找键，声明名仅做小写比较，原名不丢失。
    pub fn find_folded(&self, folded: &str) -> Option<&'static str> {
        self.fields
            .iter()
            .find(|f| f.name.to_lowercase() == folded)
            .map(|f| f.name)
    }
}

/// 记录形状的运行期值：字段值与 [`StructMeta::fields`] 一一对应。
#[derive(Debug, Clone, PartialEq)]
pub struct StructValue {
    pub meta: &'static StructMeta,
    pub fields: Vec<Value>,
}

impl StructValue {
    /// 全 `Null` 字段的默认实例（写路径途中实例化用）。
    pub fn empty(meta: &'static StructMeta) -> Self {
        Self { meta, fields: vec![Value::Null; meta.fields.len()] }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.meta.field_index(name).and_then(|i| self.fields.get(i))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.meta.field_index(name).and_then(|i| self.fields.get_mut(i))
    }
}

/// 由 [`param_struct!`] 为业务 struct 实现：静态元数据与到 [`Value`] 的转换。
pub trait StructModel: Sized {
    const META: &'static StructMeta;

    /// 转为记录形状的 [`Value`]（按 `META.fields` 顺序取字段）。
    fn to_value(&self) -> Value;
}

/// 从 [`Value`] 还原类型化值（结果装配方向）。
///
/// `None` 表示形状或范围不匹配；`Null` 对标量同样返回 `None`，
/// 由 `Option<T>` 的实现把 `Null` 映射为 `Some(None)`。
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! from_value_int {
    ($($t:ty),+ $(,)?) => {
        $(impl FromValue for $t {
            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::I64(v) => (*v).try_into().ok(),
                    Value::U64(v) => (*v).try_into().ok(),
                    _ => None,
                }
            }
        })+
    };
}

from_value_int!(i8, i16, i32, i64, u8, u16, u32, u64);

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::F64(v) => Some(*v),
            Value::I64(v) => Some(*v as f64),
            Value::U64(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(v) => Some(v.clone().into_owned()),
            _ => None,
        }
    }
}

impl FromValue for time::OffsetDateTime {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::DateTime(v) => Some(*v),
            _ => None,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => items.iter().map(T::from_value).collect(),
            _ => None,
        }
    }
}

/// 声明一个可被属性导航的业务 struct：生成 [`StructMeta`]、
/// [`StructModel`]、[`FromValue`] 与 `From<T> for Value`。
///
/// 每个字段必填 `ty`（声明类型名），可选 `elem`（序列元素类型名）、
/// `nested`（嵌套记录类型）、`get`/`set`（访问能力，默认均为 `true`）。
/// 还原方向要求 struct 实现 `Default`。
///
/// 用法示例：
///
/// ```ignore
/// #[derive(Clone, Default)]
/// struct User { id: i64, name: String, orders: Vec<Order> }
///
/// halo_mapper::param_struct! {
///   impl User {
///     id:     { ty: "i64" },
///     name:   { ty: "String" },
///     orders: { ty: "Vec<Order>", elem: "Order", nested: Order },
///   }
/// }
/// ```
#[macro_export]
macro_rules! param_struct {
    (
        impl $ty:ty {
            $(
                $field:ident : { ty: $fty:literal $(, elem: $elem:literal)? $(, nested: $nested:ty)? $(, get: $get:literal)? $(, set: $set:literal)? $(,)? }
            ),* $(,)?
        }
    ) => {
        impl $crate::meta::StructModel for $ty {
            const META: &'static $crate::meta::StructMeta = &$crate::meta::StructMeta {
                name: stringify!($ty),
                fields: &[
                    $(
                        $crate::meta::FieldMeta {
                            name: stringify!($field),
                            ty: $fty,
                            elem: $crate::__param_struct_opt!($($elem)?),
                            nested: $crate::__param_struct_nested!($($nested)?),
                            get: $crate::__param_struct_flag!($($get)?),
                            set: $crate::__param_struct_flag!($($set)?),
                        }
                    ),*
                ],
            };

            fn to_value(&self) -> $crate::value::Value {
                $crate::value::Value::Struct($crate::meta::StructValue {
                    meta: <$ty as $crate::meta::StructModel>::META,
                    fields: vec![
                        $(
                            $crate::value::Value::from(self.$field.clone())
                        ),*
                    ],
                })
            }
        }

        impl From<$ty> for $crate::value::Value {
            fn from(v: $ty) -> Self {
                $crate::meta::StructModel::to_value(&v)
            }
        }

        impl $crate::meta::FromValue for $ty {
            fn from_value(value: &$crate::value::Value) -> Option<Self> {
                let sv = match value {
                    $crate::value::Value::Struct(sv)
                        if std::ptr::eq(sv.meta, <$ty as $crate::meta::StructModel>::META) =>
                    {
                        sv
                    }
                    _ => return None,
                };
                let mut out = <$ty as Default>::default();
                let mut it = sv.fields.iter();
                $(
                    if let Some(v) = it.next() {
                        if !v.is_null() {
                            match $crate::meta::FromValue::from_value(v) {
                                Some(v) => out.$field = v,
                                None => return None,
                            }
                        }
                    }
                )*
                let _ = it;
                Some(out)
            }
        }
    };
}

/// 宏内部 helper：可选 literal 参数。
#[doc(hidden)]
#[macro_export]
macro_rules! __param_struct_opt {
    () => {
        None
    };
    ($v:literal) => {
        Some($v)
    };
}

/// 宏内部 helper：可选嵌套元数据。
#[doc(hidden)]
#[macro_export]
macro_rules! __param_struct_nested {
    () => {
        None
    };
    ($t:ty) => {
        Some(<$t as $crate::meta::StructModel>::META)
    };
}

/// 宏内部 helper：访问能力标记，缺省为 `true`。
#[doc(hidden)]
#[macro_export]
macro_rules! __param_struct_flag {
    () => {
        true
    };
    ($v:literal) => {
        $v
    };
}
