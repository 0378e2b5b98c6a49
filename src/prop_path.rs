//! 属性路径分词：把 `orders[0].customer.name` 拆成首段与剩余路径。

/// 一次属性路径分词的结果。
///
/// 以首个 `.` 切分：之前的部分为 `indexed_name`；若其中含 `[...]`，
/// 再拆出 `name` 与 `index`。不校验括号配平——畸形输入（如未闭合的 `[`）
/// 产生一个空的 `index`，由下游解析报错，这里不报错。
/// 分词是纯函数，重复分词同一字符串结果恒等。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropPath {
    name: String,
    indexed_name: String,
    index: Option<String>,
    children: Option<String>,
}

impl PropPath {
    pub fn new(full: &str) -> Self {
        let (mut name, children) = match full.find('.') {
            Some(pos) => (&full[..pos], Some(full[pos + 1..].to_string())),
            None => (full, None),
        };
        let indexed_name = name.to_string();
        let index = match name.find('[') {
            Some(pos) => {
                let idx = name.get(pos + 1..name.len().saturating_sub(1)).unwrap_or("");
                let idx = idx.to_string();
                name = &name[..pos];
                Some(idx)
            }
            None => None,
        };
        Self { name: name.to_string(), indexed_name, index, children }
    }

    /// 首段属性名（去掉索引部分）。
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 首段原文（含 `[...]`），用作导航键时保留索引。
    pub fn indexed_name(&self) -> &str {
        &self.indexed_name
    }

    /// 方括号内的索引文本，无索引时为 `None`。
    pub fn index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    /// 首个 `.` 之后的剩余路径，末段时为 `None`。
    pub fn children(&self) -> Option<&str> {
        self.children.as_deref()
    }

    pub fn has_next(&self) -> bool {
        self.children.is_some()
    }

    /// 对剩余路径再做一次分词。
    pub fn next(&self) -> Option<Self> {
        self.children.as_deref().map(Self::new)
    }
}
