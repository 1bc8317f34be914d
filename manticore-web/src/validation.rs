//! 请求体校验中间件
//!
//! Action 可以附带一个 [`ValidationSchema`]。路由构建时
//! [`ValidationMiddlewareFactory`] 把它编译成 [`ValidationMiddleware`]，
//! 作为路由链上最后一个中间件（最接近 Action）执行。
//!
//! 校验失败返回 400，`error.type` 为 `VALIDATION_ERROR`，`error.details`
//! 是以字段名为键的错误列表。

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use manticore_core::{constants, Environment};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use validator::{ValidateEmail, ValidateUrl};

use crate::error::{ConfigError, ConfigResult};
use crate::exception::{ErrorType, HttpException, RequestContext};
use crate::middleware::Middleware;

pub const VALIDATION: &str = "validation";

/// 默认请求体大小上限：1 MiB
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// 自定义规则：返回 true 表示通过
pub type CustomRule = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// 字段错误：字段名 -> 错误消息
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// 校验配置
#[derive(Clone)]
pub struct ValidationConfig {
    /// 请求体大小上限（字节）
    pub max_body_bytes: usize,
    /// 遇到第一个错误即停止
    pub stop_on_first_error: bool,
    custom_rules: HashMap<String, CustomRule>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            stop_on_first_error: false,
            custom_rules: HashMap::new(),
        }
    }
}

impl ValidationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_environment(env: &Environment) -> Self {
        let defaults = Self::default();
        let max_body_bytes = env
            .get_i64(constants::VALIDATION_MAX_BODY_BYTES)
            .and_then(|v| usize::try_from(v).ok())
            .unwrap_or(defaults.max_body_bytes);

        Self {
            max_body_bytes,
            stop_on_first_error: env
                .get_bool_or(constants::VALIDATION_STOP_ON_FIRST_ERROR, defaults.stop_on_first_error),
            ..defaults
        }
    }

    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn stop_on_first_error(mut self, enabled: bool) -> Self {
        self.stop_on_first_error = enabled;
        self
    }

    /// 注册命名的自定义规则，供 [`FieldRule::Custom`] 引用
    pub fn with_rule<F>(mut self, name: impl Into<String>, rule: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.custom_rules.insert(name.into(), Arc::new(rule));
        self
    }

    pub fn rule(&self, name: &str) -> Option<CustomRule> {
        self.custom_rules.get(name).cloned()
    }
}

impl std::fmt::Debug for ValidationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut rules: Vec<&String> = self.custom_rules.keys().collect();
        rules.sort();
        f.debug_struct("ValidationConfig")
            .field("max_body_bytes", &self.max_body_bytes)
            .field("stop_on_first_error", &self.stop_on_first_error)
            .field("custom_rules", &rules)
            .finish()
    }
}

/// 单条字段规则
///
/// 除 `Required` 外，字段缺失或为 `null` 时其余规则不生效
#[derive(Debug, Clone)]
pub enum FieldRule {
    Required,
    String,
    Integer,
    Number,
    Boolean,
    /// 字符串字符数或数组长度的下限
    MinLength(usize),
    MaxLength(usize),
    Email,
    Url,
    Pattern(Regex),
    /// 引用 [`ValidationConfig`] 中注册的规则
    Custom(String),
}

impl FieldRule {
    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(FieldRule::Pattern(Regex::new(pattern)?))
    }

    pub fn custom(name: impl Into<String>) -> Self {
        FieldRule::Custom(name.into())
    }

    /// 不满足时返回错误消息
    fn check(&self, field: &str, value: &Value) -> Option<String> {
        let ok = match (self, value) {
            (FieldRule::Required, _) | (FieldRule::Custom(_), _) => true,
            (FieldRule::String, v) => v.is_string(),
            (FieldRule::Integer, v) => v.is_i64() || v.is_u64(),
            (FieldRule::Number, v) => v.is_number(),
            (FieldRule::Boolean, v) => v.is_boolean(),
            (FieldRule::MinLength(min), v) => length_of(v).is_some_and(|len| len >= *min),
            (FieldRule::MaxLength(max), v) => length_of(v).is_some_and(|len| len <= *max),
            (FieldRule::Email, Value::String(s)) => s.validate_email(),
            (FieldRule::Url, Value::String(s)) => s.validate_url(),
            (FieldRule::Pattern(re), Value::String(s)) => re.is_match(s),
            (FieldRule::Email, _) | (FieldRule::Url, _) | (FieldRule::Pattern(_), _) => false,
        };

        if ok {
            return None;
        }

        Some(match self {
            FieldRule::Required => format!("{} is required", field),
            FieldRule::String => format!("{} must be a string", field),
            FieldRule::Integer => format!("{} must be an integer", field),
            FieldRule::Number => format!("{} must be a number", field),
            FieldRule::Boolean => format!("{} must be a boolean", field),
            FieldRule::MinLength(min) => match length_of(value) {
                Some(len) => format!("{} length must be at least {}, but was {}", field, min, len),
                None => format!("{} must be a string or an array", field),
            },
            FieldRule::MaxLength(max) => match length_of(value) {
                Some(len) => format!("{} length must be at most {}, but was {}", field, max, len),
                None => format!("{} must be a string or an array", field),
            },
            FieldRule::Email => format!("{} must be a valid email address", field),
            FieldRule::Url => format!("{} must be a valid URL", field),
            FieldRule::Pattern(re) => format!("{} must match pattern {}", field, re.as_str()),
            FieldRule::Custom(name) => format!("{} failed rule {}", field, name),
        })
    }
}

fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

/// 单个字段的规则集合
#[derive(Debug, Clone)]
pub struct FieldSchema {
    pub name: String,
    pub rules: Vec<FieldRule>,
}

/// JSON 对象请求体的校验规则
///
/// ```ignore
/// let schema = ValidationSchema::new()
///     .field("email", [FieldRule::Required, FieldRule::Email])
///     .field("age", [FieldRule::Integer]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ValidationSchema {
    fields: Vec<FieldSchema>,
}

impl ValidationSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(
        mut self,
        name: impl Into<String>,
        rules: impl IntoIterator<Item = FieldRule>,
    ) -> Self {
        self.fields.push(FieldSchema {
            name: name.into(),
            rules: rules.into_iter().collect(),
        });
        self
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// 根据 schema 构建校验中间件
#[derive(Debug, Clone, Default)]
pub struct ValidationMiddlewareFactory {
    config: Arc<ValidationConfig>,
}

impl ValidationMiddlewareFactory {
    pub fn new(config: Arc<ValidationConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// 自定义规则在此处解析；未注册的名称是配置错误
    pub fn create(&self, schema: &ValidationSchema) -> ConfigResult<Arc<ValidationMiddleware>> {
        let mut fields = Vec::with_capacity(schema.fields.len());

        for field in &schema.fields {
            let mut rules = Vec::with_capacity(field.rules.len());
            for rule in &field.rules {
                let compiled = match rule {
                    FieldRule::Custom(name) => {
                        let check = self
                            .config
                            .rule(name)
                            .ok_or_else(|| ConfigError::UnknownValidationRule(name.clone()))?;
                        CompiledRule::Custom(name.clone(), check)
                    }
                    other => CompiledRule::Builtin(other.clone()),
                };
                rules.push(compiled);
            }
            fields.push(CompiledField {
                name: field.name.clone(),
                rules,
            });
        }

        Ok(Arc::new(ValidationMiddleware {
            fields,
            max_body_bytes: self.config.max_body_bytes,
            stop_on_first_error: self.config.stop_on_first_error,
        }))
    }
}

enum CompiledRule {
    Builtin(FieldRule),
    Custom(String, CustomRule),
}

struct CompiledField {
    name: String,
    rules: Vec<CompiledRule>,
}

/// 请求体校验中间件
pub struct ValidationMiddleware {
    fields: Vec<CompiledField>,
    max_body_bytes: usize,
    stop_on_first_error: bool,
}

impl ValidationMiddleware {
    /// 校验一个 JSON 对象
    pub fn validate(&self, body: &Value) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();

        for field in &self.fields {
            let value = body.get(&field.name).filter(|v| !v.is_null());

            for rule in &field.rules {
                let message = match (rule, value) {
                    (CompiledRule::Builtin(FieldRule::Required), None) => {
                        Some(format!("{} is required", field.name))
                    }
                    (_, None) => None,
                    (CompiledRule::Builtin(rule), Some(v)) => rule.check(&field.name, v),
                    (CompiledRule::Custom(name, check), Some(v)) => {
                        (!check(v)).then(|| format!("{} failed rule {}", field.name, name))
                    }
                };

                if let Some(message) = message {
                    errors.entry(field.name.clone()).or_default().push(message);
                    if self.stop_on_first_error {
                        return Err(errors);
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl std::fmt::Debug for ValidationMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationMiddleware")
            .field("fields", &self.fields.iter().map(|f| &f.name).collect::<Vec<_>>())
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

#[async_trait]
impl Middleware for ValidationMiddleware {
    fn name(&self) -> &str {
        VALIDATION
    }

    async fn handle(&self, request: Request, next: Next) -> Response {
        let (parts, body) = request.into_parts();
        let context = RequestContext::from_parts(&parts);

        let bytes = match axum::body::to_bytes(body, self.max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(path = context.path(), error = %e, "Request body rejected");
                return HttpException::bad_request(&context, "Request body could not be read")
                    .into_response();
            }
        };

        let value = if bytes.iter().all(u8::is_ascii_whitespace) {
            Value::Object(Map::new())
        } else {
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => value,
                Err(e) => {
                    return HttpException::bad_request(&context, format!("Malformed JSON body: {}", e))
                        .into_response();
                }
            }
        };

        if !value.is_object() {
            return HttpException::bad_request(&context, "Request body must be a JSON object")
                .with_type(ErrorType::ValidationError)
                .into_response();
        }

        if let Err(errors) = self.validate(&value) {
            tracing::debug!(
                path = context.path(),
                fields = errors.len(),
                "Request validation failed"
            );
            return HttpException::bad_request(&context, "Request validation failed")
                .with_type(ErrorType::ValidationError)
                .with_details(serde_json::json!(errors))
                .into_response();
        }

        next.run(Request::from_parts(parts, Body::from(bytes))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn factory(config: ValidationConfig) -> ValidationMiddlewareFactory {
        ValidationMiddlewareFactory::new(Arc::new(config))
    }

    fn user_schema() -> ValidationSchema {
        ValidationSchema::new()
            .field("email", [FieldRule::Required, FieldRule::Email])
            .field("name", [FieldRule::Required, FieldRule::String, FieldRule::MinLength(2)])
            .field("age", [FieldRule::Integer])
            .field("homepage", [FieldRule::Url])
    }

    #[test]
    fn test_valid_body_passes() {
        let middleware = factory(ValidationConfig::default()).create(&user_schema()).unwrap();
        let body = json!({
            "email": "ada@example.com",
            "name": "Ada",
            "age": 36,
            "homepage": "https://example.com"
        });
        assert!(middleware.validate(&body).is_ok());
    }

    #[test]
    fn test_optional_fields_may_be_absent() {
        let middleware = factory(ValidationConfig::default()).create(&user_schema()).unwrap();
        let body = json!({"email": "ada@example.com", "name": "Ada", "age": null});
        assert!(middleware.validate(&body).is_ok());
    }

    #[test]
    fn test_errors_are_collected_per_field() {
        let middleware = factory(ValidationConfig::default()).create(&user_schema()).unwrap();
        let errors = middleware
            .validate(&json!({"email": "nope", "name": "A", "age": 1.5}))
            .unwrap_err();

        assert_eq!(errors.len(), 3);
        assert_eq!(errors["email"], vec!["email must be a valid email address"]);
        assert_eq!(errors["name"], vec!["name length must be at least 2, but was 1"]);
        assert_eq!(errors["age"], vec!["age must be an integer"]);
    }

    #[test]
    fn test_stop_on_first_error() {
        let config = ValidationConfig::default().stop_on_first_error(true);
        let middleware = factory(config).create(&user_schema()).unwrap();

        let errors = middleware.validate(&json!({})).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors.contains_key("email"));
    }

    #[test]
    fn test_pattern_and_max_length() {
        let schema = ValidationSchema::new()
            .field("code", [FieldRule::pattern("^[A-Z]{3}$").unwrap(), FieldRule::MaxLength(3)]);
        let middleware = factory(ValidationConfig::default()).create(&schema).unwrap();

        assert!(middleware.validate(&json!({"code": "ABC"})).is_ok());
        let errors = middleware.validate(&json!({"code": "abcd"})).unwrap_err();
        assert_eq!(errors["code"].len(), 2);
    }

    #[test]
    fn test_custom_rule_is_resolved_from_config() {
        let config = ValidationConfig::default()
            .with_rule("even", |v: &Value| v.as_i64().is_some_and(|n| n % 2 == 0));
        let schema = ValidationSchema::new().field("n", [FieldRule::custom("even")]);
        let middleware = factory(config).create(&schema).unwrap();

        assert!(middleware.validate(&json!({"n": 4})).is_ok());
        assert_eq!(
            middleware.validate(&json!({"n": 3})).unwrap_err()["n"],
            vec!["n failed rule even"]
        );
    }

    #[test]
    fn test_unknown_custom_rule_is_a_config_error() {
        let schema = ValidationSchema::new().field("n", [FieldRule::custom("prime")]);
        let err = factory(ValidationConfig::default()).create(&schema).unwrap_err();
        assert_eq!(err, ConfigError::UnknownValidationRule("prime".into()));
    }

    #[test]
    fn test_config_from_environment() {
        use manticore_core::{ConfigValue, MapPropertySource};

        let env = Environment::new();
        env.add_property_source(Box::new(
            MapPropertySource::new("test")
                .with_property(constants::VALIDATION_MAX_BODY_BYTES, ConfigValue::Int(64))
                .with_property(constants::VALIDATION_STOP_ON_FIRST_ERROR, ConfigValue::Bool(true)),
        ));

        let config = ValidationConfig::from_environment(&env);
        assert_eq!(config.max_body_bytes, 64);
        assert!(config.stop_on_first_error);
    }
}
