use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Column-oriented result table returned for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    pub name: String,
    pub fields: Vec<Field>,

    /// Search metadata such as `{"shards": {"total", "failed"}}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub values: Vec<Value>,
}

impl DataFrame {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            meta: None,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, values: Vec<Value>) -> Self {
        self.fields.push(Field {
            name: name.into(),
            values,
        });
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn row_count(&self) -> usize {
        self.fields.first().map(|f| f.values.len()).unwrap_or(0)
    }
}
