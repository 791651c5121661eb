use std::fmt::{Display, Formatter};

use paperfolio_core::{EnvelopeMeta, Lineage, ProviderId, ValidationError};
use uuid::Uuid;

/// Request identifier (UUID v4) stamped on every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Envelope metadata for one command run.
pub fn envelope_meta(
    request_id: RequestId,
    source_chain: Vec<ProviderId>,
    lineage: Option<Lineage>,
    latency_ms: u64,
    cache_hit: bool,
    warnings: Vec<String>,
) -> Result<EnvelopeMeta, ValidationError> {
    let mut meta = EnvelopeMeta::new(request_id.to_string(), source_chain, latency_ms, cache_hit)?
        .with_lineage(lineage);
    for warning in warnings {
        meta.push_warning(warning);
    }
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperfolio_core::envelope::SCHEMA_VERSION;
    use paperfolio_core::Confidence;

    #[test]
    fn request_id_is_uuid_v4() {
        let request_id = RequestId::new_v4();
        assert_eq!(request_id.0.get_version_num(), 4);
        assert_eq!(request_id.to_string().len(), 36);
    }

    #[test]
    fn meta_carries_chain_and_warnings() {
        let meta = envelope_meta(
            RequestId::new_v4(),
            vec![ProviderId::Coingecko, ProviderId::Warehouse],
            Some(Lineage {
                provenance: Some(ProviderId::Warehouse),
                confidence: Confidence::Medium,
                provisional: false,
            }),
            12,
            false,
            vec![String::from("fallback succeeded with 'warehouse' after 1 failed attempt(s)")],
        )
        .expect("valid meta");

        assert_eq!(meta.schema_version, SCHEMA_VERSION);
        assert_eq!(meta.source_chain.len(), 2);
        assert_eq!(meta.warnings.len(), 1);
        assert_eq!(
            meta.lineage.and_then(|lineage| lineage.provenance),
            Some(ProviderId::Warehouse)
        );
        assert!(meta.validate().is_ok());
    }
}
