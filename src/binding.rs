//! `#{}` 绑定标记：内容语法解析与占位符改写。
//!
//! 标记内容的形式是 `属性表达式[, 选项=值]*`，另支持 `属性:JDBC类型`
//! 旧式简写。属性表达式本身在渲染完成后才按参数对象解析，
//! 这里只负责把标记变成方言占位符并按出现顺序登记描述符。

use std::fmt;
use std::str::FromStr;

use crate::flavor::Flavor;
use crate::token::parse_tokens;

/// 绑定标记内容不合法。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyntaxError {
    #[error("mapper empty property expression in placeholder {content:?}")]
    EmptyExpression { content: String },
    #[error("mapper malformed option {part:?} in placeholder {content:?}")]
    MalformedOption { part: String, content: String },
    #[error("mapper unknown option {name:?} in placeholder {content:?}")]
    UnknownOption { name: String, content: String },
    #[error("mapper numericScale {value:?} is not a non-negative integer")]
    BadNumericScale { value: String },
    #[error("mapper unknown parameter mode {value:?}")]
    BadMode { value: String },
}

/// 参数方向。存储过程场景用 OUT/INOUT，普通查询恒为 IN。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamMode {
    #[default]
    In,
    Out,
    InOut,
}

impl FromStr for ParamMode {
    type Err = SyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN" => Ok(Self::In),
            "OUT" => Ok(Self::Out),
            "INOUT" => Ok(Self::InOut),
            _ => Err(SyntaxError::BadMode { value: s.to_string() }),
        }
    }
}

impl fmt::Display for ParamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::In => "IN",
            Self::Out => "OUT",
            Self::InOut => "INOUT",
        })
    }
}

/// 一个 `#{}` 标记解析出的绑定描述符。
///
/// `property` 是留待执行期解析的属性表达式；其余字段是值到驱动
/// 参数的转换提示，本库原样保存，交给上层驱动适配使用。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub property: String,
    pub mode: ParamMode,
    pub java_type: Option<String>,
    pub jdbc_type: Option<String>,
    pub numeric_scale: Option<u32>,
    pub type_handler: Option<String>,
    pub result_map: Option<String>,
}

impl Binding {
    /// 只有属性表达式、其余提示留空的描述符。
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            mode: ParamMode::In,
            java_type: None,
            jdbc_type: None,
            numeric_scale: None,
            type_handler: None,
            result_map: None,
        }
    }

    /// 解析 `#{}` 标记的内容。
    pub fn parse(content: &str) -> Result<Self, SyntaxError> {
        let mut parts = content.split(',');
        let head = parts.next().unwrap_or("").trim();
        // `属性:JDBC类型` 简写
        let (property, shorthand) = match head.split_once(':') {
            Some((p, t)) => (p.trim(), Some(t.trim())),
            None => (head, None),
        };
        if property.is_empty() {
            return Err(SyntaxError::EmptyExpression { content: content.to_string() });
        }
        let mut binding = Self::new(property);
        binding.jdbc_type = shorthand.map(str::to_string);
        for part in parts {
            let part = part.trim();
            let Some((name, value)) = part.split_once('=') else {
                return Err(SyntaxError::MalformedOption {
                    part: part.to_string(),
                    content: content.to_string(),
                });
            };
            let value = value.trim();
            match name.trim() {
                "javaType" => binding.java_type = Some(value.to_string()),
                "jdbcType" => binding.jdbc_type = Some(value.to_string()),
                "mode" => binding.mode = value.parse()?,
                "numericScale" => {
                    let scale = value.parse().map_err(|_| SyntaxError::BadNumericScale {
                        value: value.to_string(),
                    })?;
                    binding.numeric_scale = Some(scale);
                }
                "typeHandler" => binding.type_handler = Some(value.to_string()),
                "resultMap" => binding.result_map = Some(value.to_string()),
                other => {
                    return Err(SyntaxError::UnknownOption {
                        name: other.to_string(),
                        content: content.to_string(),
                    });
                }
            }
        }
        Ok(binding)
    }
}

/// 扫描 `sql` 中的 `#{}` 标记：每个标记替换成 `flavor` 的位置占位符，
/// 描述符按出现顺序收集。占位符与描述符的序号一一对应。
pub fn scan_placeholders(sql: &str, flavor: Flavor) -> Result<(String, Vec<Binding>), SyntaxError> {
    let mut bindings = Vec::new();
    let sql = parse_tokens(sql, "#{", "}", &mut |content| {
        bindings.push(Binding::parse(content)?);
        Ok(flavor.placeholder(bindings.len()))
    })?;
    Ok((sql, bindings))
}
