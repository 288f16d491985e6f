use serde::{ Deserialize, Serialize };

pub const EDM_STRING: &str = "Edm.String";
pub const COLLECTION_EDM_SINGLE: &str = "Collection(Edm.Single)";

/// An index definition as accepted by the search service's `indexes` resource.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchIndex {
    pub name: String,
    pub fields: Vec<SearchField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_search: Option<VectorSearch>,
}

impl SearchIndex {
    pub fn field(&self, name: &str) -> Option<&SearchField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub searchable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored: Option<bool>,
    /// Vector length; only set on vector fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_search_profile: Option<String>,
}

impl SearchField {
    pub fn key(name: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: EDM_STRING.to_string(),
            key: true,
            searchable: None,
            stored: None,
            dimensions: None,
            vector_search_profile: None,
        }
    }

    pub fn searchable_text(name: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: EDM_STRING.to_string(),
            key: false,
            searchable: Some(true),
            stored: None,
            dimensions: None,
            vector_search_profile: None,
        }
    }

    pub fn vector(name: &str, dimensions: u32, profile: &str, stored: bool) -> Self {
        Self {
            name: name.to_string(),
            field_type: COLLECTION_EDM_SINGLE.to_string(),
            key: false,
            searchable: Some(true),
            stored: Some(stored),
            dimensions: Some(dimensions),
            vector_search_profile: Some(profile.to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VectorSearch {
    pub algorithms: Vec<VectorSearchAlgorithm>,
    pub profiles: Vec<VectorSearchProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressions: Option<Vec<CompressionConfig>>,
}

impl VectorSearch {
    pub fn profile(&self, name: &str) -> Option<&VectorSearchProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AlgorithmKind {
    Hnsw,
    ExhaustiveKnn,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum VectorSearchMetric {
    Cosine,
    Euclidean,
    DotProduct,
    Hamming,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HnswParameters {
    pub m: u32,
    pub ef_construction: u32,
    pub ef_search: u32,
    pub metric: VectorSearchMetric,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VectorSearchAlgorithm {
    pub name: String,
    pub kind: AlgorithmKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hnsw_parameters: Option<HnswParameters>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VectorSearchProfile {
    pub name: String,
    /// Name of the algorithm configuration this profile uses.
    pub algorithm: String,
    /// Name of the compression configuration, if any.
    #[serde(default)]
    pub compression: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CompressionKind {
    ScalarQuantization,
    BinaryQuantization,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RescoreStorageMethod {
    PreserveOriginals,
    DiscardOriginals,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RescoringOptions {
    pub enable_rescoring: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_oversampling: Option<f64>,
    pub rescore_storage_method: RescoreStorageMethod,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScalarQuantizationParameters {
    pub quantized_data_type: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompressionConfig {
    pub name: String,
    pub kind: CompressionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scalar_quantization_parameters: Option<ScalarQuantizationParameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rescoring_options: Option<RescoringOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncation_dimension: Option<u32>,
}
