//! 属性导航：在 bean / map / 序列三种形状上统一读写点分路径。
//!
//! 读侧 [`Navigator`] 与写侧 [`NavigatorMut`] 分开：读只需要共享引用，
//! 渲染期可以对同一参数对象并发求值；写持有独占引用并注入对象工厂，
//! 途中遇到 `Null` 的中间段按声明类型实例化默认值。

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use crate::factory::ObjectFactory;
use crate::meta::{FieldMeta, StructMeta};
use crate::prop_path::PropPath;
use crate::value::Value;

/// 导航失败。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PathError {
    #[error("mapper no property named {name} on {ty}")]
    Unresolvable { name: String, ty: &'static str },
    #[error("mapper property {name} is not readable")]
    NoGetter { name: String },
    #[error("mapper property {name} is not writable")]
    NoSetter { name: String },
    #[error("mapper index {index:?} in segment {segment:?} is not a non-negative integer")]
    BadIndex { index: String, segment: String },
    #[error("mapper index {index} out of range, length is {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("mapper cannot index into {ty}")]
    NotIndexable { ty: &'static str },
    #[error("mapper cannot append to {ty}")]
    NotAppendable { ty: &'static str },
    #[error("mapper no default instance for type {ty}")]
    CannotInstantiate { ty: String },
}

static NULL_VALUE: Value = Value::Null;

/// 解析一段中的属性名部分。`Null` 宿主读到 `None`（读短路，不报错）；
/// bean 上未声明的属性名是错误；map 缺键是 `None`。
pub(crate) fn prop_step<'v>(host: &'v Value, name: &str) -> Result<Option<&'v Value>, PathError> {
    match host {
        Value::Null => Ok(None),
        Value::Struct(sv) => match sv.meta.field(name) {
            Some(field) if field.get => Ok(Some(sv.get(name).unwrap_or(&NULL_VALUE))),
            Some(_) => Err(PathError::NoGetter { name: name.to_string() }),
            None => Err(PathError::Unresolvable { name: name.to_string(), ty: sv.meta.name }),
        },
        Value::Map(m) => Ok(m.get(name)),
        other => Err(PathError::Unresolvable { name: name.to_string(), ty: other.type_name() }),
    }
}

/// 解析一段中的索引部分。序列要求非负整数且在界内；map 把索引文本当键。
pub(crate) fn index_step<'v>(
    host: &'v Value,
    index: &str,
    segment: &str,
) -> Result<Option<&'v Value>, PathError> {
    match host {
        Value::Null => Ok(None),
        Value::Array(items) => {
            let i: usize = index.parse().map_err(|_| PathError::BadIndex {
                index: index.to_string(),
                segment: segment.to_string(),
            })?;
            match items.get(i) {
                Some(v) => Ok(Some(v)),
                None => Err(PathError::IndexOutOfRange { index: i, len: items.len() }),
            }
        }
        Value::Map(m) => Ok(m.get(index)),
        other => Err(PathError::NotIndexable { ty: other.type_name() }),
    }
}

/// 解析完整的一段（属性名 + 可选索引）。属性名为空时直接索引宿主。
fn seg_ref<'v>(host: &'v Value, prop: &PropPath) -> Result<Option<&'v Value>, PathError> {
    let base = if prop.name().is_empty() { Some(host) } else { prop_step(host, prop.name())? };
    let Some(index) = prop.index() else {
        return Ok(base);
    };
    match base {
        Some(v) => index_step(v, index, prop.indexed_name()),
        None => Ok(None),
    }
}

/// 读侧导航器，包装一个根值。
#[derive(Debug, Clone, Copy)]
pub struct Navigator<'a> {
    root: &'a Value,
}

impl<'a> Navigator<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self { root }
    }

    /// 递归读取路径指向的值。`Null` 中间段读短路为 `Null`；
    /// 序列索引越界与 bean 上未声明的属性名是错误。
    pub fn get_value(&self, path: &str) -> Result<Value, PathError> {
        let mut host = self.root;
        let mut prop = PropPath::new(path);
        loop {
            let resolved = seg_ref(host, &prop)?;
            let next = prop.next();
            match (resolved, next) {
                (None, _) => return Ok(Value::Null),
                (Some(v), None) => return Ok(v.clone()),
                (Some(v), Some(rest)) => {
                    if v.is_null() {
                        return Ok(Value::Null);
                    }
                    host = v;
                    prop = rest;
                }
            }
        }
    }

    /// 整条路径可读：每段都能解析且末段可读。值缺失的 bean 段退回静态元数据。
    pub fn has_getter(&self, path: &str) -> bool {
        has_cap(self.root, path, false)
    }

    /// 整条路径可写：map 形状恒可写，bean 逐段检查写能力。
    pub fn has_setter(&self, path: &str) -> bool {
        has_cap(self.root, path, true)
    }

    /// 末段的声明读类型；带索引的序列段拆一层元素类型，拆不出时退回擦除的 `Value`。
    pub fn getter_type(&self, path: &str) -> Result<&'static str, PathError> {
        cap_type(self.root, path, false)
    }

    /// 末段的声明写类型。
    pub fn setter_type(&self, path: &str) -> Result<&'static str, PathError> {
        cap_type(self.root, path, true)
    }

    /// 把大小写/下划线不敏感的路径解析为规范点分形式。
    /// `case_fold` 为 true 时先去掉查找键里的下划线；任一段解析失败返回 `None`。
    /// bean 形状的解析结果按（元数据地址, 路径）做进程级缓存。
    pub fn find_canonical_name(&self, path: &str, case_fold: bool) -> Option<String> {
        match self.root {
            Value::Struct(sv) => canon_cached(sv.meta, path, case_fold),
            Value::Map(_) => Some(path.to_string()),
            _ => None,
        }
    }

    /// 根值是否为可追加的序列形状。
    pub fn is_collection_shaped(&self) -> bool {
        matches!(self.root, Value::Array(_))
    }
}

/// 写侧导航器：独占根值 + 注入的对象工厂。
pub struct NavigatorMut<'a> {
    root: &'a mut Value,
    factory: &'a dyn ObjectFactory,
}

impl<'a> NavigatorMut<'a> {
    pub fn new(root: &'a mut Value, factory: &'a dyn ObjectFactory) -> Self {
        Self { root, factory }
    }

    /// 递归写入。`Null` 中间段在传入值非 `Null` 时按声明类型实例化默认值
    /// 后继续；传入值为 `Null` 时整个操作是 no-op（不物化死分支）。
    pub fn set_value(&mut self, path: &str, value: Value) -> Result<(), PathError> {
        set_in(self.root, self.factory, path, value)
    }

    /// 向序列形状的根追加一个元素；其他形状报错。
    pub fn append_one(&mut self, value: Value) -> Result<(), PathError> {
        match &mut *self.root {
            Value::Array(items) => {
                items.push(value);
                Ok(())
            }
            other => Err(PathError::NotAppendable { ty: other.type_name() }),
        }
    }

    /// 追加一串元素。
    pub fn append_all(&mut self, values: Vec<Value>) -> Result<(), PathError> {
        match &mut *self.root {
            Value::Array(items) => {
                items.extend(values);
                Ok(())
            }
            other => Err(PathError::NotAppendable { ty: other.type_name() }),
        }
    }
}

fn has_cap(host: &Value, path: &str, want_set: bool) -> bool {
    let prop = PropPath::new(path);
    match host {
        Value::Struct(sv) => {
            let Some(field) = sv.meta.field(prop.name()) else {
                return false;
            };
            if !(if want_set { field.set } else { field.get }) {
                return false;
            }
            match prop.children() {
                None => true,
                Some(rest) => match seg_ref(host, &prop) {
                    Ok(Some(v)) if !v.is_null() => has_cap(v, rest, want_set),
                    Ok(_) => static_has(field, rest, want_set),
                    Err(_) => false,
                },
            }
        }
        Value::Map(m) => {
            if want_set {
                return true;
            }
            match prop.children() {
                None => m.contains_key(prop.name()),
                Some(rest) => match seg_ref(host, &prop) {
                    Ok(Some(v)) if !v.is_null() => has_cap(v, rest, false),
                    // 键存在但值为 Null：map 没有声明类型可以否定后续段
                    Ok(Some(_)) => true,
                    _ => false,
                },
            }
        }
        _ => false,
    }
}

/// 值缺失时沿静态元数据继续判断能力；没有嵌套描述就无从回答。
fn static_has(field: &FieldMeta, path: &str, want_set: bool) -> bool {
    let Some(meta) = field.nested else {
        return false;
    };
    let prop = PropPath::new(path);
    let Some(next) = meta.field(prop.name()) else {
        return false;
    };
    if !(if want_set { next.set } else { next.get }) {
        return false;
    }
    match prop.children() {
        None => true,
        Some(rest) => static_has(next, rest, want_set),
    }
}

fn cap_type(host: &Value, path: &str, want_set: bool) -> Result<&'static str, PathError> {
    let prop = PropPath::new(path);
    match prop.children() {
        Some(rest) => match seg_ref(host, &prop)? {
            Some(v) if !v.is_null() => cap_type(v, rest, want_set),
            _ => static_type_from(host, path, want_set),
        },
        None => terminal_type(host, &prop, want_set),
    }
}

fn terminal_type(host: &Value, prop: &PropPath, want_set: bool) -> Result<&'static str, PathError> {
    match host {
        Value::Null => Ok("Value"),
        Value::Struct(sv) => {
            let field = sv
                .meta
                .field(prop.name())
                .ok_or_else(|| PathError::Unresolvable {
                    name: prop.name().to_string(),
                    ty: sv.meta.name,
                })?;
            if want_set && !field.set {
                return Err(PathError::NoSetter { name: prop.name().to_string() });
            }
            if !want_set && !field.get {
                return Err(PathError::NoGetter { name: prop.name().to_string() });
            }
            if prop.index().is_some() {
                Ok(field.elem.unwrap_or("Value"))
            } else {
                Ok(field.ty)
            }
        }
        // map 与直接索引的序列没有声明类型：有值用运行期形状名，缺失退回擦除形状
        Value::Map(_) | Value::Array(_) => {
            Ok(seg_ref(host, prop)?.map(Value::type_name).unwrap_or("Value"))
        }
        other => Err(PathError::Unresolvable {
            name: prop.name().to_string(),
            ty: other.type_name(),
        }),
    }
}

fn static_type_from(host: &Value, path: &str, want_set: bool) -> Result<&'static str, PathError> {
    match host {
        Value::Struct(sv) => static_type_in(sv.meta, path, want_set),
        _ => Ok("Value"),
    }
}

fn static_type_in(
    meta: &'static StructMeta,
    path: &str,
    want_set: bool,
) -> Result<&'static str, PathError> {
    let prop = PropPath::new(path);
    let field = meta.field(prop.name()).ok_or_else(|| PathError::Unresolvable {
        name: prop.name().to_string(),
        ty: meta.name,
    })?;
    match prop.children() {
        None => {
            if want_set && !field.set {
                return Err(PathError::NoSetter { name: prop.name().to_string() });
            }
            if !want_set && !field.get {
                return Err(PathError::NoGetter { name: prop.name().to_string() });
            }
            if prop.index().is_some() {
                Ok(field.elem.unwrap_or("Value"))
            } else {
                Ok(field.ty)
            }
        }
        Some(rest) => match field.nested {
            Some(next) => static_type_in(next, rest, want_set),
            None => Ok("Value"),
        },
    }
}

type CanonKey = (usize, bool, String);

static CANON_CACHE: OnceLock<Mutex<HashMap<CanonKey, Option<String>>>> = OnceLock::new();

fn canon_cached(meta: &'static StructMeta, path: &str, case_fold: bool) -> Option<String> {
    let cache = CANON_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let key: CanonKey = (meta as *const StructMeta as usize, case_fold, path.to_string());
    {
        let g = cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(hit) = g.get(&key) {
            return hit.clone();
        }
    }
    // 解析是纯函数，竞态下重复计算只是幂等覆盖
    let computed = canon_compute(meta, path, case_fold);
    let mut g = cache.lock().unwrap_or_else(|e| e.into_inner());
    g.insert(key, computed.clone());
    computed
}

fn canon_compute(meta: &'static StructMeta, path: &str, case_fold: bool) -> Option<String> {
    let lookup = if case_fold { path.replace('_', "") } else { path.to_string() };
    let mut out = String::new();
    if canon_build(meta, &lookup, &mut out) { Some(out) } else { None }
}

fn canon_build(meta: &'static StructMeta, path: &str, out: &mut String) -> bool {
    let prop = PropPath::new(path);
    let Some(canonical) = meta.find_folded(&prop.name().to_lowercase()) else {
        return false;
    };
    out.push_str(canonical);
    match prop.children() {
        None => true,
        Some(rest) => {
            let Some(next) = meta.field(canonical).and_then(|f| f.nested) else {
                return false;
            };
            out.push('.');
            canon_build(next, rest, out)
        }
    }
}

fn set_in(
    host: &mut Value,
    factory: &dyn ObjectFactory,
    path: &str,
    value: Value,
) -> Result<(), PathError> {
    let prop = PropPath::new(path);
    match prop.children() {
        None => set_segment(host, factory, &prop, value),
        Some(rest) => {
            let rest = rest.to_string();
            match ensure_segment(host, factory, &prop, value.is_null())? {
                Some(next) => set_in(next, factory, &rest, value),
                None => Ok(()),
            }
        }
    }
}

/// 为 [`FieldMeta::elem`] 构造元素视角的字段描述，供序列元素物化使用。
fn elem_field(field: &FieldMeta) -> FieldMeta {
    FieldMeta {
        name: field.name,
        ty: field.elem.unwrap_or("Value"),
        elem: None,
        nested: field.nested,
        get: true,
        set: true,
    }
}

/// 定位中间段的可变槽位；`Null` 槽位在 `incoming_null` 为 false 时物化。
/// 返回 `None` 表示本次写整体为 no-op。
fn ensure_segment<'v>(
    host: &'v mut Value,
    factory: &dyn ObjectFactory,
    prop: &PropPath,
    incoming_null: bool,
) -> Result<Option<&'v mut Value>, PathError> {
    if host.is_null() {
        if incoming_null {
            return Ok(None);
        }
        *host = factory.create(None)?;
    }

    let (slot, field): (&mut Value, Option<FieldMeta>) = if prop.name().is_empty() {
        (host, None)
    } else {
        match host {
            Value::Struct(sv) => {
                let i = sv.meta.field_index(prop.name()).ok_or_else(|| {
                    PathError::Unresolvable { name: prop.name().to_string(), ty: sv.meta.name }
                })?;
                let f = sv.meta.fields[i];
                (&mut sv.fields[i], Some(f))
            }
            Value::Map(m) => {
                if !m.contains_key(prop.name()) && incoming_null {
                    return Ok(None);
                }
                (m.entry(prop.name().to_string()).or_insert(Value::Null), None)
            }
            other => {
                return Err(PathError::Unresolvable {
                    name: prop.name().to_string(),
                    ty: other.type_name(),
                });
            }
        }
    };

    if slot.is_null() {
        if incoming_null {
            return Ok(None);
        }
        if let Some(f) = &field {
            if !f.set {
                return Err(PathError::NoSetter { name: prop.name().to_string() });
            }
        }
        *slot = factory.create(field.as_ref())?;
    }

    let Some(index) = prop.index() else {
        return Ok(Some(slot));
    };
    match slot {
        Value::Array(items) => {
            let len = items.len();
            let i: usize = index.parse().map_err(|_| PathError::BadIndex {
                index: index.to_string(),
                segment: prop.indexed_name().to_string(),
            })?;
            let el = items.get_mut(i).ok_or(PathError::IndexOutOfRange { index: i, len })?;
            if el.is_null() {
                if incoming_null {
                    return Ok(None);
                }
                let ef = field.as_ref().map(elem_field);
                *el = factory.create(ef.as_ref())?;
            }
            Ok(Some(el))
        }
        Value::Map(m) => {
            match m.get_mut(index) {
                Some(el) => {
                    if el.is_null() {
                        if incoming_null {
                            return Ok(None);
                        }
                        *el = factory.create(None)?;
                    }
                }
                None => {
                    if incoming_null {
                        return Ok(None);
                    }
                    m.insert(index.to_string(), factory.create(None)?);
                }
            }
            Ok(m.get_mut(index))
        }
        other => Err(PathError::NotIndexable { ty: other.type_name() }),
    }
}

fn set_segment(
    host: &mut Value,
    factory: &dyn ObjectFactory,
    prop: &PropPath,
    value: Value,
) -> Result<(), PathError> {
    let Some(index) = prop.index() else {
        match host {
            Value::Null => {
                if value.is_null() {
                    return Ok(());
                }
                *host = factory.create(None)?;
                return set_segment(host, factory, prop, value);
            }
            Value::Struct(sv) => {
                let i = sv.meta.field_index(prop.name()).ok_or_else(|| {
                    PathError::Unresolvable { name: prop.name().to_string(), ty: sv.meta.name }
                })?;
                if !sv.meta.fields[i].set {
                    return Err(PathError::NoSetter { name: prop.name().to_string() });
                }
                sv.fields[i] = value;
                return Ok(());
            }
            Value::Map(m) => {
                m.insert(prop.name().to_string(), value);
                return Ok(());
            }
            other => {
                return Err(PathError::Unresolvable {
                    name: prop.name().to_string(),
                    ty: other.type_name(),
                });
            }
        }
    };

    // 终段带索引：容器必须已存在且可索引
    let container: &mut Value = if prop.name().is_empty() {
        host
    } else {
        match host {
            Value::Struct(sv) => {
                let i = sv.meta.field_index(prop.name()).ok_or_else(|| {
                    PathError::Unresolvable { name: prop.name().to_string(), ty: sv.meta.name }
                })?;
                &mut sv.fields[i]
            }
            Value::Map(m) => match m.get_mut(prop.name()) {
                Some(v) => v,
                None => return Err(PathError::NotIndexable { ty: "null" }),
            },
            other => {
                return Err(PathError::Unresolvable {
                    name: prop.name().to_string(),
                    ty: other.type_name(),
                });
            }
        }
    };
    match container {
        Value::Array(items) => {
            let len = items.len();
            let i: usize = index.parse().map_err(|_| PathError::BadIndex {
                index: index.to_string(),
                segment: prop.indexed_name().to_string(),
            })?;
            match items.get_mut(i) {
                Some(slot) => {
                    *slot = value;
                    Ok(())
                }
                None => Err(PathError::IndexOutOfRange { index: i, len }),
            }
        }
        Value::Map(m) => {
            m.insert(index.to_string(), value);
            Ok(())
        }
        other => Err(PathError::NotIndexable { ty: other.type_name() }),
    }
}
