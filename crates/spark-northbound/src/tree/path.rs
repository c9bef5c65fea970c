//! 数据路径解析：`/module:top/list[key='v'][k2="w"]/leaf-list[.='x']`。
//!
//! 谓词值可以使用单引号或双引号，引号内允许出现 `/` 与 `]`。
//! 不存在转义语法，因此同时含有两种引号的值无法写入路径，构造谓词时即被拒绝。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{NbError, NbResult};

/// 路径中的一段：节点名加上可选的键谓词。
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathSegment {
    pub name: String,
    pub predicates: Vec<(String, String)>,
}

impl PathSegment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            predicates: Vec::new(),
        }
    }

    pub fn with_predicate(mut self, key: impl Into<String>, value: impl Into<String>) -> NbResult<Self> {
        self.push_predicate(key, value)?;
        Ok(self)
    }

    /// 追加谓词；值同时含有 `'` 与 `"` 时返回 `Validation`。
    pub fn push_predicate(&mut self, key: impl Into<String>, value: impl Into<String>) -> NbResult<()> {
        let value = value.into();
        if value.contains('\'') && value.contains('"') {
            return Err(NbError::validation(format!(
                "predicate value `{value}` contains both quote characters"
            )));
        }
        self.predicates.push((key.into(), value));
        Ok(())
    }

    /// 叶子列表条目 `[.='v']` 中的值。
    pub fn self_value(&self) -> Option<&str> {
        self.predicates
            .iter()
            .find(|(key, _)| key == ".")
            .map(|(_, value)| value.as_str())
    }

    pub fn predicate(&self, key: &str) -> Option<&str> {
        self.predicates
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value.as_str())
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (key, value) in &self.predicates {
            if value.contains('\'') {
                write!(f, "[{key}=\"{value}\"]")?;
            } else {
                write!(f, "[{key}='{value}']")?;
            }
        }
        Ok(())
    }
}

/// 解析后的绝对数据路径。
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct DataPath {
    segments: Vec<PathSegment>,
}

impl DataPath {
    pub fn parse(raw: &str) -> NbResult<Self> {
        let malformed = |why: &str| NbError::validation(format!("malformed path `{raw}`: {why}"));

        let body = raw.strip_prefix('/').ok_or_else(|| malformed("must be absolute"))?;
        let mut segments = Vec::new();
        let mut chars = body.chars().peekable();

        while chars.peek().is_some() {
            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c == '/' || c == '[' {
                    break;
                }
                name.push(c);
                chars.next();
            }
            if name.is_empty() {
                return Err(malformed("empty segment"));
            }
            let mut segment = PathSegment::new(name);

            while chars.peek() == Some(&'[') {
                chars.next();
                let mut key = String::new();
                loop {
                    match chars.next() {
                        Some('=') => break,
                        Some(']') | None => return Err(malformed("predicate without `=`")),
                        Some(c) if c.is_whitespace() => {}
                        Some(c) => key.push(c),
                    }
                }
                let quote = match chars.next() {
                    Some(q @ ('\'' | '"')) => q,
                    _ => return Err(malformed("predicate value must be quoted")),
                };
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some(c) if c == quote => break,
                        Some(c) => value.push(c),
                        None => return Err(malformed("unterminated quote")),
                    }
                }
                if chars.next() != Some(']') {
                    return Err(malformed("expected `]`"));
                }
                if key.is_empty() {
                    return Err(malformed("empty predicate key"));
                }
                segment.predicates.push((key, value));
            }

            match chars.next() {
                None | Some('/') => {}
                Some(c) => return Err(malformed(&format!("unexpected `{c}`"))),
            }
            segments.push(segment);
        }

        if segments.is_empty() {
            return Err(malformed("empty path"));
        }
        Ok(Self { segments })
    }

    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn segments_mut(&mut self) -> &mut [PathSegment] {
        &mut self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.segments.last()
    }

    /// 去掉谓词后的模式路径。
    pub fn schema_path(&self) -> String {
        self.schema_prefix(self.segments.len())
    }

    /// 前 `depth` 段对应的模式路径。
    pub fn schema_prefix(&self, depth: usize) -> String {
        let mut out = String::new();
        for segment in &self.segments[..depth.min(self.segments.len())] {
            out.push('/');
            out.push_str(&segment.name);
        }
        out
    }

    pub fn parent(&self) -> Option<DataPath> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn child(&self, segment: PathSegment) -> DataPath {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

/// 数据路径对应的模式路径。
pub fn schema_path_of(raw: &str) -> NbResult<String> {
    DataPath::parse(raw).map(|path| path.schema_path())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_predicates_with_embedded_separators() {
        let path = DataPath::parse("/r:routes/route[prefix='10.0.0.0/8'][vrf=\"it's\"]/nexthop[.='a]b']")
            .expect("合法路径");
        assert_eq!(path.len(), 3);
        assert_eq!(path.segments()[1].predicate("prefix"), Some("10.0.0.0/8"));
        assert_eq!(path.segments()[1].predicate("vrf"), Some("it's"));
        assert_eq!(path.segments()[2].self_value(), Some("a]b"));
        assert_eq!(path.schema_path(), "/r:routes/route/nexthop");
    }

    #[test]
    fn display_round_trips() {
        let raw = "/r:routes/route[prefix='10.0.0.0/8']/metric";
        assert_eq!(DataPath::parse(raw).expect("合法路径").to_string(), raw);
        let parent = DataPath::parse(raw).expect("合法路径").parent().expect("存在父路径");
        assert_eq!(parent.to_string(), "/r:routes/route[prefix='10.0.0.0/8']");
    }

    #[test]
    fn rejects_malformed_input() {
        for raw in ["relative/path", "/", "/a[b]", "/a[b='c]", "/a//b", "/a[b=c]"] {
            assert!(
                matches!(DataPath::parse(raw), Err(NbError::Validation(_))),
                "`{raw}` 应被拒绝"
            );
        }
    }

    #[test]
    fn values_with_either_quote_render_and_parse_back() {
        let segment = PathSegment::new("route")
            .with_predicate("vrf", "it's")
            .and_then(|segment| segment.with_predicate("tag", "say \"hi\""))
            .expect("只含一种引号");
        let path = DataPath::from_segments(vec![PathSegment::new("r:routes"), segment]);
        assert_eq!(path.to_string(), "/r:routes/route[vrf=\"it's\"][tag='say \"hi\"']");
        assert_eq!(DataPath::parse(&path.to_string()).expect("可重新解析"), path);
    }

    #[test]
    fn values_with_both_quotes_are_rejected() {
        let err = PathSegment::new("route")
            .with_predicate("vrf", "it's \"x\"")
            .expect_err("两种引号无法渲染");
        assert!(matches!(err, NbError::Validation(_)));

        let mut segment = PathSegment::new("tag");
        assert!(segment.push_predicate(".", "a'b\"c").is_err());
        assert!(segment.predicates.is_empty(), "被拒绝的谓词不留痕迹");
    }
}
