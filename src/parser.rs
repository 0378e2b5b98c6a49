//! 模板解析：XML 片段到节点树，并区分静态与动态模板。
//!
//! 片段先包进一个合成根元素交给 quick-xml，收拢为一棵轻量 DOM，
//! 再按固定的标签表派发成 [`SqlNode`]。含任何动态标签或未转义
//! `${}` 的片段是动态模板，纯文本片段在构建期一次性预渲染。

use indexmap::IndexMap;
use quick_xml::Reader;
use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::{BytesStart, Event};
use tracing::debug;

use crate::binding::SyntaxError;
use crate::config::MapperConfig;
use crate::evaluator::EvalError;
use crate::nodes::{ForEachNode, SqlNode};
use crate::source::{DynamicSqlSource, RawSqlSource, SqlSource};
use crate::token::contains_token;

/// 模板构建期错误。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    #[error("mapper malformed template markup: {0}")]
    Xml(String),
    #[error("mapper unknown element <{tag}> in sql template")]
    UnknownElement { tag: String },
    #[error("mapper too many otherwise elements in choose")]
    TooManyOtherwise,
    #[error("mapper element <{tag}> requires attribute {attr:?}")]
    MissingAttribute { tag: String, attr: &'static str },
    #[error(transparent)]
    Placeholder(#[from] SyntaxError),
    #[error(transparent)]
    Prerender(#[from] EvalError),
}

/// 模板解析器。持有解析出的 SQL 源渲染时共享的配置。
#[derive(Debug, Clone, Default)]
pub struct TemplateParser {
    config: MapperConfig,
}

impl TemplateParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: MapperConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// 解析片段为节点树，并返回它是否动态。
    pub fn parse_fragment(&self, fragment: &str) -> Result<(SqlNode, bool), BuildError> {
        let children = read_fragment(fragment)?;
        let mut dynamic = false;
        let root = parse_contents(&children, &mut dynamic)?;
        debug!(dynamic, "parsed sql template fragment");
        Ok((root, dynamic))
    }

    /// 解析片段为可渲染的 SQL 源。静态片段在这里一次性预渲染，
    /// 之后每次取用都是同一份文本。
    pub fn parse(&self, fragment: &str) -> Result<Box<dyn SqlSource>, BuildError> {
        let (root, dynamic) = self.parse_fragment(fragment)?;
        if dynamic {
            Ok(Box::new(DynamicSqlSource::new(self.config.clone(), root)))
        } else {
            Ok(Box::new(RawSqlSource::new(&self.config, &root)?))
        }
    }
}

/// 轻量 DOM：解析一趟攒出来，树构建完即丢弃。
#[derive(Debug, Clone)]
enum Content {
    Text(String),
    Element {
        tag: String,
        attrs: IndexMap<String, String>,
        children: Vec<Content>,
    },
}

struct Frame {
    tag: String,
    attrs: IndexMap<String, String>,
    children: Vec<Content>,
}

fn read_fragment(fragment: &str) -> Result<Vec<Content>, BuildError> {
    let doc = format!("<script>{fragment}</script>");
    let mut reader = Reader::from_str(&doc);
    let mut stack: Vec<Frame> = Vec::new();

    loop {
        match reader.read_event().map_err(|e| BuildError::Xml(e.to_string()))? {
            Event::Start(e) => {
                stack.push(Frame {
                    tag: name_of(&e)?,
                    attrs: attrs_of(&e)?,
                    children: Vec::new(),
                });
            }
            Event::Empty(e) => {
                let child = Content::Element {
                    tag: name_of(&e)?,
                    attrs: attrs_of(&e)?,
                    children: Vec::new(),
                };
                push_child(&mut stack, child)?;
            }
            Event::End(_) => {
                // quick-xml 已校验开闭标签配对
                let Some(frame) = stack.pop() else {
                    return Err(BuildError::Xml("unbalanced end tag".to_string()));
                };
                if stack.is_empty() {
                    // 合成根元素闭合，片段读完
                    return Ok(frame.children);
                }
                let element = Content::Element {
                    tag: frame.tag,
                    attrs: frame.attrs,
                    children: frame.children,
                };
                push_child(&mut stack, element)?;
            }
            Event::Text(e) => {
                let text = e.decode().map_err(|err| BuildError::Xml(err.to_string()))?;
                push_text(&mut stack, &text)?;
            }
            Event::CData(e) => {
                let text = std::str::from_utf8(e.as_ref())
                    .map_err(|err| BuildError::Xml(err.to_string()))?;
                push_text(&mut stack, text)?;
            }
            Event::GeneralRef(e) => {
                let raw = e.decode().map_err(|err| BuildError::Xml(err.to_string()))?;
                push_text(&mut stack, &resolve_entity(&raw)?)?;
            }
            Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
            Event::Eof => {
                return Err(BuildError::Xml("unexpected end of template markup".to_string()));
            }
        }
    }
}

fn name_of(e: &BytesStart<'_>) -> Result<String, BuildError> {
    std::str::from_utf8(e.name().as_ref())
        .map(str::to_string)
        .map_err(|err| BuildError::Xml(err.to_string()))
}

fn attrs_of(e: &BytesStart<'_>) -> Result<IndexMap<String, String>, BuildError> {
    let mut attrs = IndexMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| BuildError::Xml(err.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|err| BuildError::Xml(err.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|err| BuildError::Xml(err.to_string()))?;
        attrs.insert(key.to_string(), value.into_owned());
    }
    Ok(attrs)
}

/// 实体引用解析：预定义实体、数值实体，未知实体原样保留。
fn resolve_entity(raw: &str) -> Result<String, BuildError> {
    if let Some(resolved) = resolve_xml_entity(raw) {
        return Ok(resolved.to_string());
    }
    if let Some(rest) = raw.strip_prefix('#') {
        let code = if let Some(hex) = rest.strip_prefix('x').or_else(|| rest.strip_prefix('X')) {
            u32::from_str_radix(hex, 16)
                .map_err(|_| BuildError::Xml(format!("invalid hex entity: #{rest}")))?
        } else {
            rest.parse::<u32>()
                .map_err(|_| BuildError::Xml(format!("invalid decimal entity: #{rest}")))?
        };
        let ch = char::from_u32(code)
            .ok_or_else(|| BuildError::Xml(format!("invalid character reference: {code}")))?;
        return Ok(ch.to_string());
    }
    Ok(format!("&{raw};"))
}

fn push_child(stack: &mut [Frame], child: Content) -> Result<(), BuildError> {
    let Some(top) = stack.last_mut() else {
        return Err(BuildError::Xml("content outside template root".to_string()));
    };
    top.children.push(child);
    Ok(())
}

fn push_text(stack: &mut [Frame], text: &str) -> Result<(), BuildError> {
    if text.is_empty() {
        return Ok(());
    }
    let Some(top) = stack.last_mut() else {
        return Err(BuildError::Xml("content outside template root".to_string()));
    };
    // 相邻文本片段（实体边界、CDATA 边界）并成一个节点
    if let Some(Content::Text(last)) = top.children.last_mut() {
        last.push_str(text);
    } else {
        top.children.push(Content::Text(text.to_string()));
    }
    Ok(())
}

fn parse_contents(children: &[Content], dynamic: &mut bool) -> Result<SqlNode, BuildError> {
    let mut nodes = Vec::new();
    for child in children {
        match child {
            Content::Text(text) => {
                if contains_token(text, "${", "}") {
                    nodes.push(SqlNode::Text(text.clone()));
                    *dynamic = true;
                } else {
                    nodes.push(SqlNode::StaticText(text.clone()));
                }
            }
            Content::Element { tag, attrs, children } => {
                nodes.push(parse_element(tag, attrs, children, dynamic)?);
                *dynamic = true;
            }
        }
    }
    Ok(SqlNode::Mixed(nodes))
}

fn parse_element(
    tag: &str,
    attrs: &IndexMap<String, String>,
    children: &[Content],
    dynamic: &mut bool,
) -> Result<SqlNode, BuildError> {
    match tag {
        // 游离的 when 等价于 if，游离的 otherwise 是纯透传
        "if" | "when" => Ok(SqlNode::If {
            test: require_attr(attrs, tag, "test")?,
            body: Box::new(parse_contents(children, dynamic)?),
        }),
        "otherwise" => parse_contents(children, dynamic),
        "choose" => parse_choose(children, dynamic),
        "trim" => Ok(SqlNode::trim(
            parse_contents(children, dynamic)?,
            attrs.get("prefix").cloned(),
            parse_overrides(attrs.get("prefixOverrides")),
            attrs.get("suffix").cloned(),
            parse_overrides(attrs.get("suffixOverrides")),
        )),
        "where" => Ok(SqlNode::where_clause(parse_contents(children, dynamic)?)),
        "set" => Ok(SqlNode::set_clause(parse_contents(children, dynamic)?)),
        "foreach" => Ok(SqlNode::ForEach(Box::new(ForEachNode {
            collection: require_attr(attrs, tag, "collection")?,
            item: require_attr(attrs, tag, "item")?,
            index: attrs.get("index").cloned(),
            open: attrs.get("open").cloned().unwrap_or_default(),
            close: attrs.get("close").cloned().unwrap_or_default(),
            separator: attrs.get("separator").cloned().unwrap_or_default(),
            body: parse_contents(children, dynamic)?,
        }))),
        "bind" => Ok(SqlNode::Bind {
            name: require_attr(attrs, tag, "name")?,
            value: require_attr(attrs, tag, "value")?,
        }),
        other => Err(BuildError::UnknownElement { tag: other.to_string() }),
    }
}

fn parse_choose(children: &[Content], dynamic: &mut bool) -> Result<SqlNode, BuildError> {
    let mut whens = Vec::new();
    let mut otherwise = None;
    for child in children {
        // choose 只识别 when/otherwise 子元素，其余内容不参与分支
        let Content::Element { tag, attrs, children } = child else {
            continue;
        };
        match tag.as_str() {
            "when" => {
                let test = require_attr(attrs, "when", "test")?;
                whens.push((test, parse_contents(children, dynamic)?));
            }
            "otherwise" => {
                if otherwise.is_some() {
                    return Err(BuildError::TooManyOtherwise);
                }
                otherwise = Some(Box::new(parse_contents(children, dynamic)?));
            }
            _ => {}
        }
    }
    Ok(SqlNode::Choose { whens, otherwise })
}

fn require_attr(
    attrs: &IndexMap<String, String>,
    tag: &str,
    attr: &'static str,
) -> Result<String, BuildError> {
    attrs
        .get(attr)
        .cloned()
        .ok_or_else(|| BuildError::MissingAttribute { tag: tag.to_string(), attr })
}

fn parse_overrides(attr: Option<&String>) -> Vec<String> {
    match attr {
        Some(text) => text
            .split('|')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    }
}
