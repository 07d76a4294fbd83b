// Copyright (c) Graphfeed Contributors
// SPDX-License-Identifier: Apache-2.0

//! Entity-kind to query-template dispatch.
//!
//! Each ingested entity kind carries two templates: a push-subscription
//! query (payload contents are never trusted, so it only selects `id`) and
//! a paginated pull query parameterized by `contractAddress`, `uts`,
//! `limit` and `skip`. The registry is validated at construction so an
//! unknown or empty template fails fast instead of producing a null query
//! on the wire.

use std::collections::BTreeMap;

use crate::error::{IngestError, IngestResult};
use crate::subscriber::NamedSubscription;

/// Query templates for one entity kind.
#[derive(Clone, Debug)]
pub struct EntityQueries {
    pub subscription: String,
    pub fetch: String,
}

/// Lookup table from entity-kind discriminator to its query templates.
#[derive(Clone, Debug)]
pub struct EntityQueryRegistry {
    entries: BTreeMap<String, EntityQueries>,
}

impl EntityQueryRegistry {
    /// Builds a registry, rejecting empty discriminators or templates.
    pub fn new(entries: BTreeMap<String, EntityQueries>) -> IngestResult<Self> {
        for (kind, queries) in &entries {
            if kind.trim().is_empty() {
                return Err(IngestError::MissingParameter("entity_kind"));
            }
            if queries.subscription.trim().is_empty() {
                return Err(IngestError::MissingParameter("subscription_query"));
            }
            if queries.fetch.trim().is_empty() {
                return Err(IngestError::MissingParameter("fetch_query"));
            }
        }
        Ok(Self { entries })
    }

    /// The gateway entity set this service ingests by default.
    pub fn gateway_entities() -> Self {
        let entities: &[(&str, &[&str])] = &[
            (
                "stakeRequesteds",
                &[
                    "id",
                    "amount",
                    "gateway",
                    "staker",
                    "stakerNonce",
                    "beneficiary",
                    "gasPrice",
                    "gasLimit",
                    "stakeRequestHash",
                ],
            ),
            (
                "stakeIntentDeclareds",
                &[
                    "id",
                    "messageHash",
                    "staker",
                    "stakerNonce",
                    "amount",
                    "beneficiary",
                ],
            ),
            (
                "stakeIntentConfirmeds",
                &[
                    "id",
                    "messageHash",
                    "staker",
                    "stakerNonce",
                    "beneficiary",
                    "amount",
                    "blockHash",
                ],
            ),
            ("stateRootAvailables", &["id", "blockHeight", "stateRoot"]),
            ("gatewayProvens", &["id", "gateway", "blockHeight", "storageRoot"]),
        ];

        let mut entries = BTreeMap::new();
        for (kind, fields) in entities {
            entries.insert(
                kind.to_string(),
                EntityQueries {
                    subscription: subscription_query(kind),
                    fetch: fetch_query(kind, fields),
                },
            );
        }
        Self::new(entries).expect("default entity registry is valid")
    }

    /// Pull-query template for a discriminator; unknown kinds fail fast.
    pub fn fetch_query(&self, entity_kind: &str) -> IngestResult<&str> {
        self.entries
            .get(entity_kind)
            .map(|queries| queries.fetch.as_str())
            .ok_or_else(|| IngestError::UnknownEntityKind(entity_kind.to_string()))
    }

    /// The declared named subscriptions, one per entity kind.
    pub fn named_subscriptions(&self) -> Vec<NamedSubscription> {
        self.entries
            .iter()
            .map(|(kind, queries)| NamedSubscription {
                name: kind.clone(),
                query: queries.subscription.clone(),
            })
            .collect()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn subscription_query(entity_kind: &str) -> String {
    format!("subscription {{ {} {{ id }} }}", entity_kind)
}

fn fetch_query(entity_kind: &str, fields: &[&str]) -> String {
    // Every fetched record must carry the fields the pipeline reads.
    let mut selection = fields.join("\n    ");
    selection.push_str("\n    uts\n    contractAddress\n    blockNumber");
    format!(
        r#"query ($contractAddress: Bytes!, $uts: BigInt!, $limit: Int!, $skip: Int!) {{
  {entity_kind}(
    where: {{contractAddress: $contractAddress, uts_gt: $uts}},
    orderBy: uts,
    orderDirection: asc,
    first: $limit,
    skip: $skip
  ) {{
    {selection}
  }}
}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_entities_complete() {
        let registry = EntityQueryRegistry::gateway_entities();
        assert_eq!(registry.len(), 5);
        let kinds: Vec<&str> = registry.kinds().collect();
        assert!(kinds.contains(&"stakeRequesteds"));
        assert!(kinds.contains(&"stateRootAvailables"));
    }

    #[test]
    fn test_fetch_query_selects_required_fields() {
        let registry = EntityQueryRegistry::gateway_entities();
        let query = registry.fetch_query("stakeRequesteds").unwrap();
        assert!(query.contains("uts_gt: $uts"));
        assert!(query.contains("contractAddress: $contractAddress"));
        assert!(query.contains("first: $limit"));
        assert!(query.contains("skip: $skip"));
        assert!(query.contains("orderBy: uts"));
        // The pipeline reads these off every record.
        assert!(query.contains("contractAddress\n"));
        assert!(query.contains("uts\n"));
    }

    #[test]
    fn test_unknown_entity_kind_fails_fast() {
        let registry = EntityQueryRegistry::gateway_entities();
        let err = registry.fetch_query("minteds").unwrap_err();
        assert!(matches!(err, IngestError::UnknownEntityKind(_)));
        assert!(err.to_string().contains("minteds"));
    }

    #[test]
    fn test_named_subscriptions_match_kinds() {
        let registry = EntityQueryRegistry::gateway_entities();
        let subs = registry.named_subscriptions();
        assert_eq!(subs.len(), registry.len());
        for sub in &subs {
            assert!(sub.query.starts_with("subscription"));
            assert!(sub.query.contains(&sub.name));
        }
    }

    #[test]
    fn test_new_rejects_empty_subscription_template() {
        let mut entries = BTreeMap::new();
        entries.insert(
            "stakeRequesteds".to_string(),
            EntityQueries {
                subscription: "  ".to_string(),
                fetch: "query { stakeRequesteds { id } }".to_string(),
            },
        );
        let err = EntityQueryRegistry::new(entries).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Mandatory parameter 'subscription_query' is missing or invalid."
        );
    }

    #[test]
    fn test_new_rejects_empty_fetch_template() {
        let mut entries = BTreeMap::new();
        entries.insert(
            "stakeRequesteds".to_string(),
            EntityQueries {
                subscription: "subscription { stakeRequesteds { id } }".to_string(),
                fetch: String::new(),
            },
        );
        let err = EntityQueryRegistry::new(entries).unwrap_err();
        assert!(matches!(err, IngestError::MissingParameter("fetch_query")));
    }

    #[test]
    fn test_new_rejects_empty_kind() {
        let mut entries = BTreeMap::new();
        entries.insert(
            "".to_string(),
            EntityQueries {
                subscription: "subscription { x { id } }".to_string(),
                fetch: "query { x { id } }".to_string(),
            },
        );
        assert!(EntityQueryRegistry::new(entries).is_err());
    }
}
