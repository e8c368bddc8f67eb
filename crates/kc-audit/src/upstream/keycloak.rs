//! Keycloak admin REST API client.

use std::time::Duration;

use async_trait::async_trait;
use kc_model::{EntityType, Snapshot};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde_json::{Map, Value};

use super::{
    UpstreamEntity, UpstreamError, UpstreamProvider, UpstreamResult, is_name_keyed, name_key,
};

const LIST_PAGE_SIZE: usize = 100;

/// Thin client for the Keycloak admin REST API.
///
/// Authenticates every request with a static bearer token.
///
/// The admin API ignores null fields on update. To clear a user or group
/// field the client sends an empty value instead: `{}` for `attributes`,
/// an empty string otherwise. Other entity types get the nulls as is, so
/// fields cannot be cleared on them.
#[derive(Debug, Clone)]
pub struct KeycloakAdminClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl KeycloakAdminClient {
    /// Creates a client for the Keycloak instance at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::Unavailable` if `base_url` is not an
    /// absolute http(s) URL or the HTTP client cannot be built.
    pub fn new(base_url: &str, token: impl Into<String>) -> UpstreamResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| UpstreamError::Unavailable(format!("invalid Keycloak URL {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(UpstreamError::Unavailable(format!(
                "invalid Keycloak URL {base_url}: not a base URL"
            )));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| UpstreamError::Unavailable(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            token: token.into(),
        })
    }

    /// Appends percent-encoded path segments to the base URL.
    fn url(&self, segments: &[&str]) -> UpstreamResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                UpstreamError::Unavailable(format!("invalid Keycloak URL {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn collection_url(&self, realm: &str, entity_type: EntityType) -> UpstreamResult<Url> {
        self.url(&collection_segments(realm, entity_type))
    }

    fn item_url(&self, realm: &str, entity_type: EntityType, idp_id: &str) -> UpstreamResult<Url> {
        let mut segments = collection_segments(realm, entity_type);
        segments.push(idp_id);
        self.url(&segments)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token)
    }

    async fn send(&self, request: RequestBuilder) -> UpstreamResult<Response> {
        self.authorized(request)
            .send()
            .await
            .map_err(|e| UpstreamError::Unavailable(e.to_string()))
    }

    async fn fetch_list(
        &self,
        request: RequestBuilder,
        entity_type: EntityType,
    ) -> UpstreamResult<Vec<UpstreamEntity>> {
        let response = check(self.send(request).await?, entity_type, "").await?;
        let body: Vec<Value> = response
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;
        body.iter().map(|v| to_entity(entity_type, v)).collect()
    }
}

fn collection_segments(realm: &str, entity_type: EntityType) -> Vec<&str> {
    let mut segments = vec!["admin", "realms"];
    match entity_type {
        EntityType::Realm => {}
        EntityType::User => segments.extend([realm, "users"]),
        EntityType::Group => segments.extend([realm, "groups"]),
        EntityType::Client => segments.extend([realm, "clients"]),
        EntityType::Role => segments.extend([realm, "roles"]),
        EntityType::Idp => segments.extend([realm, "identity-provider", "instances"]),
    }
    segments
}

/// Update payload with nulls replaced by values the admin API applies.
fn update_body(entity_type: EntityType, state: &Snapshot) -> Value {
    let mut body = state.to_json_object();
    if !matches!(entity_type, EntityType::User | EntityType::Group) {
        return body;
    }
    if let Value::Object(fields) = &mut body {
        for (name, value) in fields.iter_mut() {
            if value.is_null() {
                *value = if name == "attributes" {
                    Value::Object(Map::new())
                } else {
                    Value::String(String::new())
                };
            }
        }
    }
    body
}

/// Key holding the id the admin API addresses an entity by.
const fn id_key(entity_type: EntityType) -> &'static str {
    if is_name_keyed(entity_type) {
        name_key(entity_type)
    } else {
        "id"
    }
}

fn to_entity(entity_type: EntityType, value: &Value) -> UpstreamResult<UpstreamEntity> {
    let state = Snapshot::from_json_object(value)
        .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;
    let idp_id = state
        .text(id_key(entity_type))
        .ok_or_else(|| {
            UpstreamError::InvalidResponse(format!(
                "{} representation without '{}'",
                entity_type.label(),
                id_key(entity_type)
            ))
        })?
        .to_string();
    Ok(UpstreamEntity { idp_id, state })
}

async fn check(
    response: Response,
    entity_type: EntityType,
    id: &str,
) -> UpstreamResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => UpstreamError::Unauthorized,
        StatusCode::NOT_FOUND => UpstreamError::not_found(entity_type, id),
        StatusCode::CONFLICT => UpstreamError::Conflict(message),
        s if s.is_server_error() => UpstreamError::Unavailable(format!("{s}: {message}")),
        s => UpstreamError::Rejected {
            status: s.as_u16(),
            message,
        },
    })
}

#[async_trait]
impl UpstreamProvider for KeycloakAdminClient {
    async fn get(
        &self,
        realm: &str,
        entity_type: EntityType,
        idp_id: &str,
    ) -> UpstreamResult<Option<UpstreamEntity>> {
        let response = self
            .send(self.http.get(self.item_url(realm, entity_type, idp_id)?))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: Value = check(response, entity_type, idp_id)
            .await?
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;
        to_entity(entity_type, &body).map(Some)
    }

    async fn find_by_name(
        &self,
        realm: &str,
        entity_type: EntityType,
        name: &str,
    ) -> UpstreamResult<Option<UpstreamEntity>> {
        if is_name_keyed(entity_type) {
            return self.get(realm, entity_type, name).await;
        }

        let url = self.collection_url(realm, entity_type)?;
        let query: Vec<(&str, &str)> = match entity_type {
            EntityType::User => vec![("username", name), ("exact", "true")],
            EntityType::Client => vec![("clientId", name)],
            _ => vec![("search", name), ("exact", "true")],
        };
        let matches = self
            .fetch_list(self.http.get(url).query(&query), entity_type)
            .await?;

        // group search matches subgroups too
        Ok(matches
            .into_iter()
            .find(|e| e.state.text(name_key(entity_type)) == Some(name)))
    }

    async fn create(
        &self,
        realm: &str,
        entity_type: EntityType,
        state: &Snapshot,
    ) -> UpstreamResult<UpstreamEntity> {
        let response = self
            .send(
                self.http
                    .post(self.collection_url(realm, entity_type)?)
                    .json(&state.to_json_object()),
            )
            .await?;
        let response = check(response, entity_type, "").await?;

        let idp_id = if is_name_keyed(entity_type) {
            state.text(name_key(entity_type)).map(str::to_string)
        } else {
            response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|location| location.rsplit('/').next())
                .map(str::to_string)
        };
        let idp_id = idp_id.ok_or_else(|| {
            UpstreamError::InvalidResponse(format!(
                "created {} without a resolvable id",
                entity_type.label()
            ))
        })?;

        tracing::debug!(realm, entity_type = %entity_type, idp_id = %idp_id, "created upstream entity");

        self.get(realm, entity_type, &idp_id).await?.ok_or_else(|| {
            UpstreamError::InvalidResponse(format!(
                "{} '{idp_id}' missing right after creation",
                entity_type.label()
            ))
        })
    }

    async fn update(
        &self,
        realm: &str,
        entity_type: EntityType,
        idp_id: &str,
        state: &Snapshot,
    ) -> UpstreamResult<()> {
        let response = self
            .send(
                self.http
                    .put(self.item_url(realm, entity_type, idp_id)?)
                    .json(&update_body(entity_type, state)),
            )
            .await?;
        check(response, entity_type, idp_id).await?;
        Ok(())
    }

    async fn delete(
        &self,
        realm: &str,
        entity_type: EntityType,
        idp_id: &str,
    ) -> UpstreamResult<()> {
        let response = self
            .send(self.http.delete(self.item_url(realm, entity_type, idp_id)?))
            .await?;
        check(response, entity_type, idp_id).await?;
        Ok(())
    }

    async fn list(
        &self,
        realm: &str,
        entity_type: EntityType,
    ) -> UpstreamResult<Vec<UpstreamEntity>> {
        let url = self.collection_url(realm, entity_type)?;

        if matches!(entity_type, EntityType::Realm | EntityType::Idp) {
            return self.fetch_list(self.http.get(url), entity_type).await;
        }

        let mut all = Vec::new();
        loop {
            let first = all.len().to_string();
            let max = LIST_PAGE_SIZE.to_string();
            let page = self
                .fetch_list(
                    self.http
                        .get(url.clone())
                        .query(&[("first", first.as_str()), ("max", max.as_str())]),
                    entity_type,
                )
                .await?;
            let done = page.len() < LIST_PAGE_SIZE;
            all.extend(page);
            if done {
                return Ok(all);
            }
        }
    }
}
