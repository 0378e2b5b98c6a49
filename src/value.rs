//! 运行期参数值模型。
//!
//! 模板求值、属性导航与参数绑定都在 [`Value`] 上进行：调用方传入的参数对象
//! 统一转换为该模型后再参与渲染。

use std::borrow::Cow;

use indexmap::IndexMap;
use time::format_description::well_known::Rfc3339;

use crate::meta::StructValue;

/// 运行期参数值。
///
/// `Map` 使用插入序映射，`foreach` 对 map 形状的遍历顺序即插入顺序；
/// `Struct` 为带静态字段描述的记录形状，见 [`crate::meta`]。
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    String(Cow<'static, str>),
    Bytes(Vec<u8>),
    DateTime(time::OffsetDateTime),
    Array(Vec<Value>),
    Map(IndexMap<String, Value>),
    Struct(StructValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// 形状名；`Struct` 返回其声明类型名。
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::I64(_) => "i64",
            Self::U64(_) => "u64",
            Self::F64(_) => "f64",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::DateTime(_) => "datetime",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
            Self::Struct(s) => s.meta.name,
        }
    }

    /// `${}` 替换使用的文本形式。
    ///
    /// `Null` 渲染为空串；字符串原样输出（不加引号）；数组以 `, ` 连接；
    /// map 与 struct 没有文本形式，渲染为空串。
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(v) => v.to_string(),
            Self::I64(v) => v.to_string(),
            Self::U64(v) => v.to_string(),
            Self::F64(v) => v.to_string(),
            Self::String(v) => v.clone().into_owned(),
            Self::Bytes(v) => {
                let mut out = String::with_capacity(v.len() * 2);
                for b in v {
                    out.push_str(&format!("{b:02X}"));
                }
                out
            }
            Self::DateTime(dt) => dt.format(&Rfc3339).map(|s| s.to_string()).unwrap_or_default(),
            Self::Array(items) => {
                let mut out = String::new();
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&item.to_text());
                }
                out
            }
            Self::Map(_) | Self::Struct(_) => String::new(),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Self::Null
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Self::I64(v as i64)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Self::I64(v as i64)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::I64(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Self::U64(v as u64)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Self::U64(v as u64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::U64(v as u64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::U64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::F64(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(Cow::Owned(v))
    }
}

impl From<&'static str> for Value {
    fn from(v: &'static str) -> Self {
        Self::String(Cow::Borrowed(v))
    }
}

impl From<time::OffsetDateTime> for Value {
    fn from(v: time::OffsetDateTime) -> Self {
        Self::DateTime(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(v: IndexMap<String, Value>) -> Self {
        Self::Map(v)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::Map(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::Value;

    #[test]
    fn from_option_some() {
        let v: Value = Some(123_i64).into();
        assert_eq!(v, Value::I64(123));
    }

    #[test]
    fn from_option_none() {
        let v: Value = Option::<i64>::None.into();
        assert_eq!(v, Value::Null);
    }

    #[test]
    fn from_unit_is_null() {
        let v: Value = ().into();
        assert_eq!(v, Value::Null);
    }

    #[test]
    fn from_string_borrowed() {
        let v: Value = "abc".into();
        assert_eq!(v, Value::String("abc".into()));
    }

    #[test]
    fn from_vec_is_array() {
        let v: Value = vec![1_i64, 2, 3].into();
        assert_eq!(v, Value::Array(vec![Value::I64(1), Value::I64(2), Value::I64(3)]));
    }

    #[test]
    fn map_from_iter_keeps_order() {
        let v: Value = Value::from_iter([("b", 1_i64), ("a", 2)]);
        match v {
            Value::Map(m) => {
                let keys: Vec<&str> = m.keys().map(String::as_str).collect();
                assert_eq!(keys, vec!["b", "a"]);
            }
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn text_form() {
        assert_eq!(Value::Null.to_text(), "");
        assert_eq!(Value::I64(-7).to_text(), "-7");
        assert_eq!(Value::from("id, name").to_text(), "id, name");
        assert_eq!(Value::from(vec![1_i64, 2]).to_text(), "1, 2");
        assert_eq!(Value::Bytes(vec![0xAB, 0x01]).to_text(), "AB01");
    }

    #[test]
    fn datetime_text_is_rfc3339() {
        let v: Value = time::macros::datetime!(2024-05-01 08:30:00 UTC).into();
        assert_eq!(v.to_text(), "2024-05-01T08:30:00Z");
    }
}
