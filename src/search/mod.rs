pub mod scenario;
pub mod schema;

use log::{ info, error, debug };
use reqwest::{ Client, RequestBuilder };
use std::fmt;
use std::sync::Arc;

use crate::auth::TokenCredential;
use crate::config::{ HttpConfig, SEARCH_API_VERSION, SEARCH_SCOPE };
use crate::error::{ Error, Result };

pub use scenario::{ validate_index_name, CompressionType, IndexScenario };
pub use schema::{
    AlgorithmKind,
    CompressionConfig,
    CompressionKind,
    HnswParameters,
    RescoreStorageMethod,
    RescoringOptions,
    ScalarQuantizationParameters,
    SearchField,
    SearchIndex,
    VectorSearch,
    VectorSearchAlgorithm,
    VectorSearchMetric,
    VectorSearchProfile,
};

pub const VECTOR_PROFILE_NAME: &str = "default-profile";
pub const HNSW_CONFIG_NAME: &str = "hnsw-config";
pub const DEFAULT_OVERSAMPLING: u32 = 10;

const HNSW_M: u32 = 4;
const HNSW_EF_CONSTRUCTION: u32 = 400;
const HNSW_EF_SEARCH: u32 = 500;

/// How requests to the search service are authorized.
#[derive(Clone)]
pub enum SearchCredential {
    ApiKey(String),
    Token(Arc<dyn TokenCredential>),
}

impl fmt::Debug for SearchCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchCredential::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            SearchCredential::Token(_) => f.write_str("Token(..)"),
        }
    }
}

/// Provisions vector indexes on a search service. The vector dimensionality
/// is fixed for every index a manager creates.
pub struct SearchIndexManager {
    client: Client,
    endpoint: String,
    credential: SearchCredential,
    index_name_prefix: String,
    vector_dimensions: u32,
    oversampling: u32,
    api_version: String,
}

impl SearchIndexManager {
    pub fn new(
        service_endpoint: &str,
        credential: SearchCredential,
        index_name_prefix: &str,
        vector_dimensions: u32
    ) -> Result<Self> {
        Self::with_http_config(
            service_endpoint,
            credential,
            index_name_prefix,
            vector_dimensions,
            &HttpConfig::default()
        )
    }

    pub fn with_http_config(
        service_endpoint: &str,
        credential: SearchCredential,
        index_name_prefix: &str,
        vector_dimensions: u32,
        http: &HttpConfig
    ) -> Result<Self> {
        if vector_dimensions == 0 {
            return Err(Error::Configuration("vector_dimensions must be a positive integer".into()));
        }
        if service_endpoint.trim().is_empty() {
            return Err(Error::Configuration("Search service endpoint is required".into()));
        }

        let endpoint = service_endpoint.trim_end_matches('/').to_string();
        info!(
            "Initializing search index manager for endpoint: {}, prefix: {}, dimensions: {}",
            endpoint,
            index_name_prefix,
            vector_dimensions
        );

        Ok(Self {
            client: http.build_client()?,
            endpoint,
            credential,
            index_name_prefix: index_name_prefix.to_string(),
            vector_dimensions,
            oversampling: DEFAULT_OVERSAMPLING,
            api_version: SEARCH_API_VERSION.to_string(),
        })
    }

    /// Oversampling factor applied when rescoring is enabled.
    pub fn with_oversampling(mut self, oversampling: u32) -> Self {
        self.oversampling = oversampling;
        self
    }

    pub fn with_api_version(mut self, api_version: &str) -> Self {
        self.api_version = api_version.to_string();
        self
    }

    pub fn vector_dimensions(&self) -> u32 {
        self.vector_dimensions
    }

    pub fn index_name(&self, scenario: &IndexScenario) -> String {
        format!("{}-{}", self.index_name_prefix, scenario.name)
    }

    fn create_base_fields(&self, stored_embedding: bool) -> Vec<SearchField> {
        vec![
            SearchField::key("id"),
            SearchField::searchable_text("title"),
            SearchField::searchable_text("content"),
            SearchField::vector(
                "embedding",
                self.vector_dimensions,
                VECTOR_PROFILE_NAME,
                stored_embedding
            )
        ]
    }

    fn create_compression_config(
        &self,
        config_type: CompressionType,
        truncate_dims: Option<u32>,
        discard_originals: bool
    ) -> CompressionConfig {
        let rescore_storage_method = if discard_originals {
            RescoreStorageMethod::DiscardOriginals
        } else {
            RescoreStorageMethod::PreserveOriginals
        };

        // Rescoring needs the full-precision vectors, so it is off once they are discarded.
        let enable_rescoring = !discard_originals;

        let rescoring_options = RescoringOptions {
            enable_rescoring,
            default_oversampling: enable_rescoring.then_some(f64::from(self.oversampling)),
            rescore_storage_method,
        };

        let (kind, scalar_quantization_parameters) = match config_type {
            CompressionType::Scalar =>
                (
                    CompressionKind::ScalarQuantization,
                    Some(ScalarQuantizationParameters {
                        quantized_data_type: "int8".to_string(),
                    }),
                ),
            CompressionType::Binary => (CompressionKind::BinaryQuantization, None),
        };

        CompressionConfig {
            name: format!("{}-compression", config_type),
            kind,
            scalar_quantization_parameters,
            rescoring_options: Some(rescoring_options),
            truncation_dimension: truncate_dims,
        }
    }

    fn create_vector_search_config(&self, compression: Option<CompressionConfig>) -> VectorSearch {
        let algorithm = VectorSearchAlgorithm {
            name: HNSW_CONFIG_NAME.to_string(),
            kind: AlgorithmKind::Hnsw,
            hnsw_parameters: Some(HnswParameters {
                m: HNSW_M,
                ef_construction: HNSW_EF_CONSTRUCTION,
                ef_search: HNSW_EF_SEARCH,
                metric: VectorSearchMetric::Cosine,
            }),
        };

        let profile = VectorSearchProfile {
            name: VECTOR_PROFILE_NAME.to_string(),
            algorithm: algorithm.name.clone(),
            compression: compression.as_ref().map(|c| c.name.clone()),
        };

        VectorSearch {
            algorithms: vec![algorithm],
            profiles: vec![profile],
            compressions: compression.map(|c| vec![c]),
        }
    }

    /// Assembles the index definition for a scenario without contacting the service.
    pub fn build_index(&self, scenario: &IndexScenario) -> Result<SearchIndex> {
        scenario.validate()?;

        let fields = self.create_base_fields(scenario.stored_embedding);
        let compression = scenario.compression_type.map(|config_type| {
            self.create_compression_config(
                config_type,
                scenario.truncate_dims,
                scenario.discard_originals
            )
        });

        let name = self.index_name(scenario);
        validate_index_name(&name)?;

        Ok(SearchIndex {
            name,
            fields,
            vector_search: Some(self.create_vector_search_config(compression)),
        })
    }

    fn index_url(&self, index_name: &str) -> String {
        format!("{}/indexes('{}')?api-version={}", self.endpoint, index_name, self.api_version)
    }

    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let request = request.header("Accept", "application/json");
        match &self.credential {
            SearchCredential::ApiKey(key) => Ok(request.header("api-key", key)),
            SearchCredential::Token(credential) => {
                let token = credential.get_token(SEARCH_SCOPE).await?;
                Ok(request.bearer_auth(token.token))
            }
        }
    }

    async fn put_index(&self, index: &SearchIndex) -> Result<()> {
        let url = self.index_url(&index.name);
        debug!("PUT {} with {} fields", url, index.fields.len());

        let request = self
            .authorize(self.client.put(&url)).await?
            .header("Prefer", "return=representation")
            .json(index);
        let response = request.send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::from_response(response).await)
        }
    }

    /// Creates or updates the index described by `scenario` and returns its name.
    /// An "already exists" answer from the service counts as success.
    pub async fn create_index(&self, scenario: &IndexScenario) -> Result<String> {
        let index = self.build_index(scenario)?;
        let index_name = index.name.clone();

        match self.put_index(&index).await {
            Ok(()) => info!("Index {} created or updated.", index_name),
            Err(e) if e.is_already_exists() => info!("Index {} already exists.", index_name),
            Err(e) => {
                error!("Error creating index {}: {:?} - {}", index_name, e.kind(), e);
                return Err(e);
            }
        }

        Ok(index_name)
    }

    pub async fn get_index(&self, index_name: &str) -> Result<SearchIndex> {
        validate_index_name(index_name)?;
        let url = self.index_url(index_name);
        let response = self.authorize(self.client.get(&url)).await?.send().await?;

        if !response.status().is_success() {
            let e = Error::from_response(response).await;
            if e.is_not_found() {
                info!("Index {} does not exist.", index_name);
            } else {
                error!("Error fetching index {}: {}", index_name, e);
            }
            return Err(e);
        }

        Ok(response.json::<SearchIndex>().await?)
    }

    pub async fn delete_index(&self, index_name: &str) -> Result<()> {
        validate_index_name(index_name)?;
        let url = self.index_url(index_name);
        let response = self.authorize(self.client.delete(&url)).await?.send().await?;

        if response.status().is_success() {
            info!("Index {} deleted.", index_name);
            return Ok(());
        }

        let e = Error::from_response(response).await;
        if e.is_not_found() {
            info!("Index {} does not exist.", index_name);
        } else {
            error!("Error deleting index {}: {}", index_name, e);
        }
        Err(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SearchIndexManager {
        SearchIndexManager::new(
            "https://example.search.windows.net/",
            SearchCredential::ApiKey("key".into()),
            "docs",
            1536
        ).unwrap()
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        let result = SearchIndexManager::new(
            "https://example.search.windows.net",
            SearchCredential::ApiKey("key".into()),
            "docs",
            0
        );
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn index_name_joins_prefix_and_scenario() {
        let manager = manager();
        assert_eq!(manager.index_name(&IndexScenario::new("v1", None)), "docs-v1");
        assert_eq!(
            manager.index_name(&IndexScenario::new("scalar-truncated", None)),
            "docs-scalar-truncated"
        );
    }

    #[test]
    fn uncompressed_scenario_has_no_compression() {
        let index = manager().build_index(&IndexScenario::new("v1", None)).unwrap();
        let vector_search = index.vector_search.unwrap();

        assert!(vector_search.compressions.is_none());
        let profile = vector_search.profile(VECTOR_PROFILE_NAME).unwrap();
        assert_eq!(profile.compression, None);
        assert_eq!(profile.algorithm, HNSW_CONFIG_NAME);
    }

    #[test]
    fn base_fields_follow_scenario_and_dimensions() {
        let scenario = IndexScenario::new("v1", None).with_stored_embedding(false);
        let index = manager().build_index(&scenario).unwrap();

        let names: Vec<&str> = index.fields
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["id", "title", "content", "embedding"]);
        assert!(index.field("id").unwrap().key);
        assert_eq!(index.field("title").unwrap().searchable, Some(true));

        let embedding = index.field("embedding").unwrap();
        assert_eq!(embedding.dimensions, Some(1536));
        assert_eq!(embedding.stored, Some(false));
        assert_eq!(embedding.vector_search_profile.as_deref(), Some(VECTOR_PROFILE_NAME));
    }

    #[test]
    fn hnsw_parameters_are_fixed() {
        let index = manager()
            .build_index(&IndexScenario::new("v1", Some(CompressionType::Binary)))
            .unwrap();
        let algorithm = &index.vector_search.unwrap().algorithms[0];
        assert_eq!(algorithm.name, "hnsw-config");
        assert_eq!(algorithm.kind, AlgorithmKind::Hnsw);
        assert_eq!(
            algorithm.hnsw_parameters,
            Some(HnswParameters {
                m: 4,
                ef_construction: 400,
                ef_search: 500,
                metric: VectorSearchMetric::Cosine,
            })
        );
    }

    #[test]
    fn scalar_with_originals_enables_rescoring() {
        let index = manager()
            .build_index(&IndexScenario::new("v1", Some(CompressionType::Scalar)))
            .unwrap();
        let vector_search = index.vector_search.unwrap();
        let compression = &vector_search.compressions.as_ref().unwrap()[0];

        assert_eq!(compression.name, "scalar-compression");
        assert_eq!(compression.kind, CompressionKind::ScalarQuantization);
        assert_eq!(
            compression.scalar_quantization_parameters.as_ref().unwrap().quantized_data_type,
            "int8"
        );
        let rescoring = compression.rescoring_options.as_ref().unwrap();
        assert!(rescoring.enable_rescoring);
        assert_eq!(rescoring.default_oversampling, Some(10.0));
        assert_eq!(rescoring.rescore_storage_method, RescoreStorageMethod::PreserveOriginals);
        assert_eq!(
            vector_search.profile(VECTOR_PROFILE_NAME).unwrap().compression.as_deref(),
            Some("scalar-compression")
        );
    }

    #[test]
    fn discarding_originals_disables_rescoring() {
        let scenario = IndexScenario::new("v1", Some(CompressionType::Scalar)).with_discard_originals(true);
        let index = manager().build_index(&scenario).unwrap();
        let compression = index.vector_search.unwrap().compressions.unwrap().remove(0);

        let rescoring = compression.rescoring_options.unwrap();
        assert!(!rescoring.enable_rescoring);
        assert_eq!(rescoring.default_oversampling, None);
        assert_eq!(rescoring.rescore_storage_method, RescoreStorageMethod::DiscardOriginals);
    }

    #[test]
    fn binary_with_truncation() {
        let scenario = IndexScenario::new("bin", Some(CompressionType::Binary)).with_truncate_dims(512);
        let manager = manager().with_oversampling(4);
        let compression = manager
            .build_index(&scenario)
            .unwrap()
            .vector_search.unwrap()
            .compressions.unwrap()
            .remove(0);

        assert_eq!(compression.name, "binary-compression");
        assert_eq!(compression.kind, CompressionKind::BinaryQuantization);
        assert!(compression.scalar_quantization_parameters.is_none());
        assert_eq!(compression.truncation_dimension, Some(512));
        assert_eq!(compression.rescoring_options.unwrap().default_oversampling, Some(4.0));
    }

    #[test]
    fn unsafe_index_names_are_rejected_before_any_request() {
        let manager = SearchIndexManager::new(
            "https://example.search.windows.net/",
            SearchCredential::ApiKey("key".into()),
            "docs')?x=1#",
            1536
        ).unwrap();
        let err = manager.build_index(&IndexScenario::new("v1", None)).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = manager.build_index(&IndexScenario::new("V1", None)).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn index_url_is_addressed_by_name() {
        assert_eq!(
            manager().index_url("docs-v1"),
            format!("https://example.search.windows.net/indexes('docs-v1')?api-version={}", SEARCH_API_VERSION)
        );
    }
}
