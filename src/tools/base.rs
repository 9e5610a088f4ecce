use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::errors::MCPError;

/// 工具参数的 JSON Schema 定义
#[derive(Debug, Clone)]
pub enum Schema {
    Object(SchemaObject),
    String(SchemaString),
    Number(SchemaNumber),
    Integer(SchemaInteger),
    Boolean(SchemaBoolean),
    Array(SchemaArray),
}

impl Schema {
    pub fn validate(&self, value: &Value) -> Result<()> {
        match self {
            Schema::Object(obj) => obj.validate(value),
            Schema::String(s) => s.validate(value),
            Schema::Number(n) => n.validate(value),
            Schema::Integer(i) => i.validate(value),
            Schema::Boolean(b) => b.validate(value),
            Schema::Array(a) => a.validate(value),
        }
    }

    /// 转为 `tools/list` 中的 `inputSchema`
    pub fn to_json_schema(&self) -> Value {
        let (mut schema, description) = match self {
            Schema::Object(obj) => {
                let properties: Map<String, Value> = obj
                    .properties
                    .iter()
                    .map(|(name, prop)| (name.clone(), prop.to_json_schema()))
                    .collect();
                (
                    json!({"type": "object", "properties": properties, "required": obj.required}),
                    &obj.description,
                )
            }
            Schema::String(s) => {
                let mut schema = json!({"type": "string"});
                if let Some(values) = &s.enum_values {
                    schema["enum"] = json!(values);
                }
                (schema, &s.description)
            }
            Schema::Number(n) => (json!({"type": "number"}), &n.description),
            Schema::Integer(i) => (json!({"type": "integer"}), &i.description),
            Schema::Boolean(b) => {
                let mut schema = json!({"type": "boolean"});
                if let Some(default) = b.default {
                    schema["default"] = json!(default);
                }
                (schema, &b.description)
            }
            Schema::Array(a) => (json!({"type": "array", "items": a.items.to_json_schema()}), &a.description),
        };
        if let Some(description) = description {
            schema["description"] = json!(description);
        }
        schema
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaObject {
    pub required: Vec<String>,
    pub properties: BTreeMap<String, Schema>,
    pub description: Option<String>,
}

impl SchemaObject {
    pub fn validate(&self, value: &Value) -> Result<()> {
        let object = value
            .as_object()
            .ok_or_else(|| MCPError::InvalidParameter("参数必须是一个对象".to_string()))?;

        for req in &self.required {
            match object.get(req) {
                None | Some(Value::Null) => {
                    return Err(MCPError::InvalidParameter(format!("缺少必需参数: {}", req)).into());
                }
                Some(_) => {}
            }
        }

        // 未声明的参数忽略；声明过的参数显式传 null 视为未传
        for (name, prop) in &self.properties {
            if let Some(value) = object.get(name).filter(|v| !v.is_null()) {
                prop.validate(value).map_err(|e| {
                    let detail = match e.downcast_ref::<MCPError>() {
                        Some(MCPError::InvalidParameter(msg)) => msg.clone(),
                        _ => e.to_string(),
                    };
                    MCPError::InvalidParameter(format!("参数 {} 无效: {}", name, detail))
                })?;
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaString {
    pub description: Option<String>,
    pub enum_values: Option<Vec<String>>,
}

impl SchemaString {
    pub fn validate(&self, value: &Value) -> Result<()> {
        let text = value
            .as_str()
            .ok_or_else(|| MCPError::InvalidParameter("应为字符串".to_string()))?;

        if let Some(enum_values) = &self.enum_values {
            if !enum_values.iter().any(|v| v == text) {
                return Err(MCPError::InvalidParameter(format!("取值必须是以下之一: {:?}", enum_values)).into());
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaNumber {
    pub description: Option<String>,
}

impl SchemaNumber {
    pub fn validate(&self, value: &Value) -> Result<()> {
        if !value.is_number() {
            return Err(MCPError::InvalidParameter("应为数字".to_string()).into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaInteger {
    pub description: Option<String>,
}

impl SchemaInteger {
    pub fn validate(&self, value: &Value) -> Result<()> {
        if !value.is_i64() && !value.is_u64() {
            return Err(MCPError::InvalidParameter("应为整数".to_string()).into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaBoolean {
    pub description: Option<String>,
    pub default: Option<bool>,
}

impl SchemaBoolean {
    pub fn validate(&self, value: &Value) -> Result<()> {
        if !value.is_boolean() {
            return Err(MCPError::InvalidParameter("应为布尔值 true 或 false".to_string()).into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SchemaArray {
    pub description: Option<String>,
    pub items: Box<Schema>,
}

impl SchemaArray {
    pub fn validate(&self, value: &Value) -> Result<()> {
        let items = value
            .as_array()
            .ok_or_else(|| MCPError::InvalidParameter("应为数组".to_string()))?;
        for item in items {
            self.items.validate(item)?;
        }
        Ok(())
    }
}

// Tool 的基础 trait 定义
#[async_trait]
pub trait MCPTool: Send + Sync {
    /// 获取工具名称
    fn name(&self) -> &str;

    /// 获取工具描述
    fn description(&self) -> &str;

    /// 获取工具参数Schema
    fn parameters_schema(&self) -> &Schema;

    /// 执行工具；返回字符串时作为纯文本回传给客户端
    async fn execute(&self, params: Value) -> Result<Value>;

    /// 验证输入参数
    fn validate_params(&self, params: &Value) -> Result<()> {
        self.parameters_schema().validate(params)
    }
}

/// 读取可选的布尔参数，缺省为 `false`
pub fn optional_bool(params: &Value, name: &str) -> Result<bool> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(other) => Err(MCPError::InvalidParameter(format!(
            "参数 {} 应为布尔值 true 或 false，实际为: {}",
            name, other
        ))
        .into()),
    }
}

/// 读取必需的字符串参数，去除首尾空白后不能为空
pub fn required_str<'a>(params: &'a Value, name: &str) -> Result<&'a str> {
    let value = params
        .get(name)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .unwrap_or_default();
    if value.is_empty() {
        return Err(MCPError::InvalidParameter(format!("必须提供{}参数", name)).into());
    }
    Ok(value)
}
