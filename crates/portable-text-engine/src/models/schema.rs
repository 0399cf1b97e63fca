use portable_text_config::SchemaConfig;

/// The type names the editor needs to know about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub block_type: String,
    pub span_type: String,
    pub default_style: String,
}

impl Default for Schema {
    fn default() -> Self {
        Self::from(&SchemaConfig::default())
    }
}

impl From<&SchemaConfig> for Schema {
    fn from(config: &SchemaConfig) -> Self {
        Self {
            block_type: config.block_type.clone(),
            span_type: config.span_type.clone(),
            default_style: config.default_style.clone(),
        }
    }
}

impl Schema {
    pub fn is_text_block(&self, type_name: &str) -> bool {
        type_name == self.block_type
    }

    pub fn is_span(&self, type_name: &str) -> bool {
        type_name == self.span_type
    }
}
