use std::future::Future;
use std::sync::Arc;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

pub type Arguments = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    Boolean,
    Integer,
    String,
}

impl ParameterType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            ParameterType::Boolean => value.is_boolean(),
            ParameterType::Integer => value.is_i64() || value.is_u64(),
            ParameterType::String => value.is_string(),
        }
    }
}

/// One named argument of a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolParameter {
    name: String,
    kind: ParameterType,
    description: Option<String>,
    required: bool,
    default: Option<Value>,
    minimum: Option<i64>,
    maximum: Option<i64>,
}

impl ToolParameter {
    fn new(name: &str, kind: ParameterType) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: None,
            required: true,
            default: None,
            minimum: None,
            maximum: None,
        }
    }

    pub fn boolean(name: &str) -> Self {
        Self::new(name, ParameterType::Boolean)
    }

    pub fn integer(name: &str) -> Self {
        Self::new(name, ParameterType::Integer)
    }

    pub fn string(name: &str) -> Self {
        Self::new(name, ParameterType::String)
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Inclusive bounds, integers only.
    pub fn with_range(mut self, minimum: i64, maximum: i64) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }

    /// A parameter with a default is optional.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self.required = false;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ParameterType {
        self.kind
    }

    pub fn required(&self) -> bool {
        self.required
    }

    fn validate(&self, value: &Value) -> Result<(), String> {
        if !self.kind.matches(value) {
            return Err(format!("`{}` must be {:?}", self.name, self.kind).to_lowercase());
        }
        if let Some(number) = value.as_i64() {
            if self.minimum.is_some_and(|min| number < min) || self.maximum.is_some_and(|max| number > max) {
                return Err(format!(
                    "`{}` out of range [{}, {}]",
                    self.name,
                    self.minimum.map(|v| v.to_string()).unwrap_or_default(),
                    self.maximum.map(|v| v.to_string()).unwrap_or_default()
                ));
            }
        }
        Ok(())
    }

    fn schema(&self) -> Value {
        let mut schema = Map::new();
        schema.insert("type".to_string(), json!(self.kind));
        if let Some(description) = &self.description {
            schema.insert("description".to_string(), json!(description));
        }
        if let Some(default) = &self.default {
            schema.insert("default".to_string(), default.clone());
        }
        if let Some(minimum) = self.minimum {
            schema.insert("minimum".to_string(), json!(minimum));
        }
        if let Some(maximum) = self.maximum {
            schema.insert("maximum".to_string(), json!(maximum));
        }
        Value::Object(schema)
    }
}

/// Executes a tool. Errors are reported to the remote caller, never raised locally.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Arguments) -> anyhow::Result<Value>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Arguments) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn call(&self, arguments: Arguments) -> anyhow::Result<Value> {
        (self.0)(arguments).await
    }
}

/// Wraps an async closure as a [`ToolHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// A local capability the remote side may call, e.g. `self.lamp.turn_on`.
#[derive(Clone)]
pub struct ToolDescriptor {
    name: String,
    description: String,
    parameters: Vec<ToolParameter>,
    handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

impl ToolDescriptor {
    pub fn new(name: &str, description: &str, handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters: vec![],
            handler,
        }
    }

    pub fn with_parameter(mut self, parameter: ToolParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &[ToolParameter] {
        &self.parameters
    }

    pub fn handler(&self) -> Arc<dyn ToolHandler> {
        self.handler.clone()
    }

    pub fn input_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.schema()))
            .collect();
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// The entry served in `tools/list`.
    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema(),
        })
    }

    /// Checks `arguments` against the declared parameters and fills in defaults.
    pub fn prepare_arguments(&self, arguments: Option<&Value>) -> Result<Arguments, String> {
        let mut prepared = match arguments {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => return Err("arguments must be an object".to_string()),
        };

        for parameter in &self.parameters {
            match prepared.get(&parameter.name) {
                Some(value) => parameter.validate(value)?,
                None => match &parameter.default {
                    Some(default) => {
                        prepared.insert(parameter.name.clone(), default.clone());
                    }
                    None if parameter.required => {
                        return Err(format!("missing required parameter `{}`", parameter.name));
                    }
                    None => {}
                },
            }
        }
        Ok(prepared)
    }
}

/// Local tools, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `tool`, replacing an earlier registration with the same name.
    pub fn register(&mut self, tool: ToolDescriptor) -> &mut Self {
        if let Some(existing) = self.tools.iter_mut().find(|t| t.name == tool.name) {
            tracing::warn!("tool {} registered twice, keeping the latest", tool.name);
            *existing = tool;
        } else {
            self.tools.push(tool);
        }
        self
    }

    pub fn with(mut self, tool: ToolDescriptor) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    /// One page of `tools/list`. The cursor is the offset of the next page.
    pub fn page(&self, cursor: Option<&str>, page_size: usize) -> Result<(Vec<Value>, Option<String>), String> {
        let offset = match cursor {
            None => 0,
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| format!("bad cursor `{}`", cursor))?,
        };
        let end = offset.saturating_add(page_size.max(1)).min(self.tools.len());
        let page = self
            .tools
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(ToolDescriptor::to_json)
            .collect();
        let next = (end < self.tools.len()).then(|| end.to_string());
        Ok((page, next))
    }
}
