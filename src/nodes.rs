//! SQL 节点树：模板解析的产物。
//!
//! 树构建之后只读，求值把文本追加进 [`DynContext`]。`apply` 的返回值
//! 表示该节点是否命中（if 的谓词为真、when 被选中），choose 靠它
//! 实现首个命中即停。

use crate::dyn_context::DynContext;
use crate::evaluator::EvalError;
use crate::token::parse_tokens;
use crate::value::Value;

/// `<where>` 裁剪的连接词，按序尝试，只裁第一个命中。
const WHERE_STRIP: &[&str] = &["AND ", "OR ", "AND\n", "OR\n", "AND\r", "OR\r", "AND\t", "OR\t"];

/// 模板节点。
#[derive(Debug, Clone, PartialEq)]
pub enum SqlNode {
    /// 纯静态文本，原样追加。
    StaticText(String),
    /// 含 `${}` 替换标记的文本，每次渲染重新替换。
    Text(String),
    /// `<if test="...">`：谓词为真时求值子树。
    If { test: String, body: Box<SqlNode> },
    /// `<choose>`：按序取第一个谓词为真的 when，否则 otherwise。
    Choose {
        whens: Vec<(String, SqlNode)>,
        otherwise: Option<Box<SqlNode>>,
    },
    /// `<foreach>`。
    ForEach(Box<ForEachNode>),
    /// `<trim>` 与它的 where/set 特化。
    Trim(Box<TrimNode>),
    /// `<bind name="..." value="..."/>`：求值后登记到当前作用域。
    Bind { name: String, value: String },
    /// 子节点按序拼接。
    Mixed(Vec<SqlNode>),
}

/// `<foreach>` 的全部配置。
#[derive(Debug, Clone, PartialEq)]
pub struct ForEachNode {
    pub collection: String,
    pub item: String,
    pub index: Option<String>,
    pub open: String,
    pub close: String,
    pub separator: String,
    pub body: SqlNode,
}

/// `<trim>` 的全部配置。override 匹配不区分大小写，只裁一次。
#[derive(Debug, Clone, PartialEq)]
pub struct TrimNode {
    pub prefix: Option<String>,
    pub prefix_overrides: Vec<String>,
    pub suffix: Option<String>,
    pub suffix_overrides: Vec<String>,
    pub body: SqlNode,
}

impl SqlNode {
    pub fn trim(
        body: SqlNode,
        prefix: Option<String>,
        prefix_overrides: Vec<String>,
        suffix: Option<String>,
        suffix_overrides: Vec<String>,
    ) -> Self {
        Self::Trim(Box::new(TrimNode {
            prefix,
            prefix_overrides,
            suffix,
            suffix_overrides,
            body,
        }))
    }

    /// `<where>`：裁掉子树开头的 AND/OR，非空时冠以 WHERE。
    pub fn where_clause(body: SqlNode) -> Self {
        Self::trim(
            body,
            Some("WHERE".to_string()),
            WHERE_STRIP.iter().map(|s| s.to_string()).collect(),
            None,
            Vec::new(),
        )
    }

    /// `<set>`：裁掉子树首尾的逗号，非空时冠以 SET。
    pub fn set_clause(body: SqlNode) -> Self {
        Self::trim(
            body,
            Some("SET".to_string()),
            vec![",".to_string()],
            None,
            vec![",".to_string()],
        )
    }

    /// 求值本节点，把贡献的文本写入 `ctx`。
    pub fn apply(&self, ctx: &mut DynContext) -> Result<bool, EvalError> {
        match self {
            Self::StaticText(text) => {
                ctx.append_sql(text);
                Ok(true)
            }
            Self::Text(text) => {
                // `${}` 替换失败宽容为空串，与 `#{}` 的严格解析形成对照
                let rendered = parse_tokens(text, "${", "}", &mut |expr| {
                    Ok::<_, EvalError>(match ctx.eval_value(expr) {
                        Ok(v) => v.to_text(),
                        Err(_) => String::new(),
                    })
                })?;
                ctx.append_sql(&rendered);
                Ok(true)
            }
            Self::If { test, body } => {
                if ctx.eval_bool(test)? {
                    body.apply(ctx)?;
                    return Ok(true);
                }
                Ok(false)
            }
            Self::Choose { whens, otherwise } => {
                for (test, body) in whens {
                    if ctx.eval_bool(test)? {
                        body.apply(ctx)?;
                        return Ok(true);
                    }
                }
                if let Some(body) = otherwise {
                    body.apply(ctx)?;
                    return Ok(true);
                }
                Ok(false)
            }
            Self::ForEach(node) => node.apply(ctx),
            Self::Trim(node) => node.apply(ctx),
            Self::Bind { name, value } => {
                let v = ctx.eval_value(value)?;
                ctx.bind_local(name, v.clone());
                ctx.bind_extra(name, v);
                Ok(true)
            }
            Self::Mixed(children) => {
                for child in children {
                    child.apply(ctx)?;
                }
                Ok(true)
            }
        }
    }
}

impl ForEachNode {
    fn apply(&self, ctx: &mut DynContext) -> Result<bool, EvalError> {
        let coll = ctx.eval_value(&self.collection)?;
        let entries: Vec<(Value, Value)> = match coll {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (Value::I64(i as i64), v))
                .collect(),
            Value::Map(m) => m.into_iter().map(|(k, v)| (Value::from(k), v)).collect(),
            other => {
                return Err(EvalError::NotIterable {
                    expr: self.collection.clone(),
                    ty: other.type_name(),
                });
            }
        };
        // 空集合连 open/close 都不输出
        if entries.is_empty() {
            return Ok(true);
        }

        let mut out = String::new();
        out.push_str(&self.open);
        let mut first = true;
        for (index_value, item_value) in entries {
            let n = ctx.unique_number();
            let item_name = synthetic_name(&self.item, n);
            ctx.push_scope();
            ctx.bind_local(&self.item, item_value.clone());
            ctx.bind_extra(&item_name, item_value);
            let mut index_name = None;
            if let Some(alias) = self.index.as_deref() {
                let name = synthetic_name(alias, n);
                ctx.bind_local(alias, index_value.clone());
                ctx.bind_extra(&name, index_value);
                index_name = Some(name);
            }

            let saved = ctx.replace_buf(String::new());
            let applied = self.body.apply(ctx);
            let captured = ctx.replace_buf(saved);
            ctx.pop_scope();
            applied?;

            // 该次迭代什么都没贡献：分隔符也不补
            if captured.trim().is_empty() {
                continue;
            }
            let rewritten = rewrite_bind_heads(
                &captured,
                &self.item,
                &item_name,
                self.index.as_deref(),
                index_name.as_deref(),
            )?;
            if !first {
                out.push_str(&self.separator);
            }
            first = false;
            out.push_str(&rewritten);
        }
        out.push_str(&self.close);
        ctx.append_sql(&out);
        Ok(true)
    }
}

impl TrimNode {
    fn apply(&self, ctx: &mut DynContext) -> Result<bool, EvalError> {
        let saved = ctx.replace_buf(String::new());
        let applied = self.body.apply(ctx);
        let captured = ctx.replace_buf(saved);
        let applied = applied?;

        let mut rest = captured.trim();
        if rest.is_empty() {
            return Ok(applied);
        }
        for ov in &self.prefix_overrides {
            if let Some(stripped) = strip_prefix_fold(rest, ov) {
                rest = stripped.trim_start();
                break;
            }
        }
        for ov in &self.suffix_overrides {
            if let Some(stripped) = strip_suffix_fold(rest, ov) {
                rest = stripped.trim_end();
                break;
            }
        }
        // 裁剪后可能只剩空白，此时视同空子树
        if rest.is_empty() {
            return Ok(applied);
        }
        let mut out = String::new();
        if let Some(prefix) = &self.prefix {
            out.push_str(prefix);
            out.push(' ');
        }
        out.push_str(rest);
        if let Some(suffix) = &self.suffix {
            out.push(' ');
            out.push_str(suffix);
        }
        ctx.append_sql(&out);
        Ok(applied)
    }
}

/// foreach 为第 `n` 次迭代的 `alias` 生成的合成绑定名。
fn synthetic_name(alias: &str, n: u32) -> String {
    format!("__frch_{alias}_{n}")
}

/// 把一次迭代输出里以别名开头的 `#{}` 标记改写为合成名。
/// 只改首段，且别名之后必须是 `.`、`,`、`:`、空白或结尾。
fn rewrite_bind_heads(
    sql: &str,
    item: &str,
    item_name: &str,
    index: Option<&str>,
    index_name: Option<&str>,
) -> Result<String, EvalError> {
    parse_tokens(sql, "#{", "}", &mut |content| {
        let rewritten = rewrite_alias(content, item, item_name)
            .or_else(|| match (index, index_name) {
                (Some(alias), Some(name)) => rewrite_alias(content, alias, name),
                _ => None,
            })
            .unwrap_or_else(|| content.to_string());
        Ok::<_, EvalError>(format!("#{{{rewritten}}}"))
    })
}

fn rewrite_alias(content: &str, alias: &str, synthetic: &str) -> Option<String> {
    let rest = content.trim_start().strip_prefix(alias)?;
    match rest.chars().next() {
        None => Some(synthetic.to_string()),
        Some(c) if c == '.' || c == ',' || c == ':' || c.is_whitespace() => {
            Some(format!("{synthetic}{rest}"))
        }
        _ => None,
    }
}

fn strip_prefix_fold<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

fn strip_suffix_fold<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    let at = s.len().checked_sub(suffix.len())?;
    let tail = s.get(at..)?;
    tail.eq_ignore_ascii_case(suffix).then(|| &s[..at])
}
