use std::collections::HashMap;

/// 变量上下文，存储一个作用域内的变量
///
/// 每个 Call 序列实例持有一个作为 local 作用域；suite 的 shared 作用域在外面包一层锁。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableContext {
    /// 变量映射表
    variables: HashMap<String, String>,
}

impl VariableContext {
    /// 创建新的空变量上下文
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入变量，已存在时覆盖
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    /// 获取变量值
    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(|s| s.as_str())
    }

    /// 批量插入变量
    pub fn extend(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        self.variables.extend(vars);
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.variables.remove(key)
    }

    pub fn clear(&mut self) {
        self.variables.clear();
    }

    /// 变量数量
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.variables
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_context_basic() {
        let mut ctx = VariableContext::new();
        assert!(ctx.is_empty());

        ctx.insert("key", "value");
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.get("key"), Some("value"));
        assert_eq!(ctx.get("missing"), None);

        ctx.insert("key", "other");
        assert_eq!(ctx.get("key"), Some("other"));
        assert_eq!(ctx.remove("key"), Some("other".to_string()));
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_variable_context_extend() {
        let mut ctx = VariableContext::new();
        let mut vars = HashMap::new();
        vars.insert("key1".to_string(), "value1".to_string());
        vars.insert("key2".to_string(), "value2".to_string());

        ctx.extend(vars);
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.get("key1"), Some("value1"));
        assert_eq!(ctx.get("key2"), Some("value2"));
    }
}
