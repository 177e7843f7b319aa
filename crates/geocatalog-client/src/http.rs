//! HTTP spatial service client

use async_trait::async_trait;
use geocatalog_core::{
    BatchRequest, DocumentId, IndexRecord, ItemsResponse, QueryPage, QuerySpec, ScoredItem,
    ServiceStats,
};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

use crate::error::{ClientError, ClientResult};
use crate::traits::{ConnectionSettings, SpatialService};

/// Client for a remote spatial index service speaking the JSON protocol
pub struct HttpSpatialClient {
    client: Client,
    settings: ConnectionSettings,
}

impl HttpSpatialClient {
    pub fn new(settings: ConnectionSettings) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ClientError::Setup(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    fn base(&self) -> &str {
        self.settings.uri.trim_end_matches('/')
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base(), path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> ClientResult<T> {
        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(transport_error)?;

        let response = check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ClientError::Decode(format!("{}: {}", url, e)))
    }

    async fn post_json<B: Serialize + ?Sized>(&self, body: &B) -> ClientResult<()> {
        let response = self
            .client
            .post(self.base())
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        check_status(response).await?;
        Ok(())
    }
}

impl fmt::Debug for HttpSpatialClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSpatialClient")
            .field("uri", &self.settings.uri)
            .field("page_size", &self.settings.page_size)
            .field("timeout", &self.settings.timeout)
            .finish()
    }
}

fn transport_error(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Unreachable(format!("request timeout: {}", e))
    } else if e.is_connect() {
        ClientError::Unreachable(format!("failed to connect: {}", e))
    } else {
        ClientError::Unreachable(e.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> ClientResult<reqwest::Response> {
    let status = response.status();
    if status != StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Http {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

#[async_trait]
impl SpatialService for HttpSpatialClient {
    fn uri(&self) -> &str {
        &self.settings.uri
    }

    async fn info(&self) -> ClientResult<ServiceStats> {
        self.get_json(self.base(), &[]).await
    }

    async fn items(&self, document_id: DocumentId) -> ClientResult<Vec<IndexRecord>> {
        let url = self.url(&format!("items/{}", document_id));
        let response: ItemsResponse = self.get_json(&url, &[]).await?;
        Ok(response.items)
    }

    async fn query(&self, spec: &QuerySpec) -> ClientResult<Vec<ScoredItem>> {
        let url = self.url(spec.predicate().as_str());
        let mut results: Vec<ScoredItem> = Vec::new();
        let mut start = 0usize;
        let mut pages = 0usize;

        loop {
            let mut params = spec.params();
            params.push(("start", start.to_string()));
            if self.settings.page_size > 0 {
                params.push(("count", self.settings.page_size.to_string()));
            }

            let page: QueryPage = self.get_json(&url, &params).await?;
            pages += 1;
            tracing::debug!(
                "{} page {}: start={} count={} hits={}",
                spec.predicate(),
                pages,
                start,
                page.count,
                page.hits
            );

            let hits = page.hits;
            start += page.count;
            results.extend(page.items);

            if results.len() >= hits {
                break;
            }
            if page.count == 0 || pages >= self.settings.max_pages {
                return Err(ClientError::IncompleteResult {
                    fetched: results.len(),
                    hits,
                    pages,
                });
            }
        }

        Ok(results)
    }

    async fn batch(&self, request: &BatchRequest) -> ClientResult<()> {
        self.post_json(request).await?;
        tracing::debug!("Batch of {} records accepted", request.len());
        Ok(())
    }

    async fn clear(&self) -> ClientResult<()> {
        self.post_json(&BatchRequest::clear()).await?;
        tracing::debug!("Index cleared at {}", self.settings.uri);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geocatalog_core::{Bbox, Geometry, Point};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HttpSpatialClient {
        HttpSpatialClient::new(ConnectionSettings::new(server.uri()).with_page_size(10)).unwrap()
    }

    fn hit(id: usize) -> serde_json::Value {
        json!({"id": id.to_string(), "score": 0.5, "bbox": [0.0, 0.0, 1.0, 1.0]})
    }

    fn page(hits: usize, ids: std::ops::Range<usize>) -> serde_json::Value {
        let items: Vec<_> = ids.map(hit).collect();
        json!({"hits": hits, "count": items.len(), "items": items})
    }

    #[tokio::test]
    async fn test_info() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"num_items": 12})))
            .mount(&server)
            .await;

        let stats = client_for(&server).info().await.unwrap();
        assert_eq!(stats.num_items, 12);
    }

    #[tokio::test]
    async fn test_info_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let err = client_for(&server).info().await.unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert!(!err.is_unreachable());
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        // Nothing listens on the discard port
        let client = HttpSpatialClient::new(
            ConnectionSettings::new("http://127.0.0.1:9").with_timeout(Duration::from_secs(2)),
        )
        .unwrap();
        let err = client.info().await.unwrap_err();
        assert!(err.is_unreachable());
    }

    #[tokio::test]
    async fn test_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "id": "42",
                    "bbox": [12.5, 41.9, 12.5, 41.9],
                    "geometry": {"type": "Point", "coordinates": [12.5, 41.9]},
                    "properties": {"path": "places/rome", "title": "Roma"}
                }]
            })))
            .mount(&server)
            .await;

        let items = client_for(&server).items(42).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "42");
        assert_eq!(items[0].properties.path, "places/rome");
        assert_eq!(items[0].bbox, Bbox::new(12.5, 41.9, 12.5, 41.9));
    }

    #[tokio::test]
    async fn test_query_pagination() {
        let server = MockServer::start().await;
        for (start, ids) in [(0, 0..10), (10, 10..20), (20, 20..25)] {
            Mock::given(method("GET"))
                .and(path("/intersection"))
                .and(query_param("bbox", "0,0,10,10"))
                .and(query_param("count", "10"))
                .and(query_param("start", start.to_string()))
                .respond_with(ResponseTemplate::new(200).set_body_json(page(25, ids)))
                .expect(1)
                .mount(&server)
                .await;
        }

        let spec = QuerySpec::intersection(Bbox::new(0.0, 0.0, 10.0, 10.0));
        let results = client_for(&server).query(&spec).await.unwrap();

        assert_eq!(results.len(), 25);
        assert_eq!(results[0].id, "0");
        assert_eq!(results[24].id, "24");
        server.verify().await;
    }

    #[tokio::test]
    async fn test_query_empty_result_is_one_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/distance"))
            .and(query_param("lon", "12.5"))
            .and(query_param("lat", "41.9"))
            .and(query_param("radius", "1000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(0, 0..0)))
            .expect(1)
            .mount(&server)
            .await;

        let spec = QuerySpec::distance(Point::new(12.5, 41.9), 1000.0);
        let results = client_for(&server).query(&spec).await.unwrap();
        assert!(results.is_empty());
        server.verify().await;
    }

    #[tokio::test]
    async fn test_query_within() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/within"))
            .and(query_param("bbox", "12,41,13,42"))
            .and(query_param("start", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(2, 0..2)))
            .expect(1)
            .mount(&server)
            .await;

        let spec = QuerySpec::Within(Bbox::new(12.0, 41.0, 13.0, 42.0));
        let results = client_for(&server).query(&spec).await.unwrap();
        assert_eq!(results.len(), 2);
        server.verify().await;
    }

    #[tokio::test]
    async fn test_query_stalled_service_is_incomplete() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/nearest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": 5, "count": 0, "items": []
            })))
            .mount(&server)
            .await;

        let spec = QuerySpec::nearest(Point::new(1.0, 2.0), 5);
        let err = client_for(&server).query(&spec).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::IncompleteResult { fetched: 0, hits: 5, pages: 1 }
        ));
    }

    #[tokio::test]
    async fn test_query_page_cap() {
        let server = MockServer::start().await;
        // Every page claims more hits are coming
        Mock::given(method("GET"))
            .and(path("/intersection"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(1_000_000, 0..1)))
            .mount(&server)
            .await;

        let client = HttpSpatialClient::new(ConnectionSettings::new(server.uri()).with_max_pages(3))
            .unwrap();
        let spec = QuerySpec::intersection(Bbox::new(0.0, 0.0, 1.0, 1.0));
        let err = client.query(&spec).await.unwrap_err();
        assert!(matches!(err, ClientError::IncompleteResult { fetched: 3, pages: 3, .. }));
    }

    #[tokio::test]
    async fn test_batch_posts_json_body() {
        let server = MockServer::start().await;
        let record = IndexRecord::new(
            7,
            Geometry::point(Point::new(1.0, 2.0)),
            Bbox::new(1.0, 2.0, 1.0, 2.0),
        );
        let request = BatchRequest::index(record);

        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_json(serde_json::to_value(&request).unwrap()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server).batch(&request).await.unwrap();
        server.verify().await;
    }

    #[tokio::test]
    async fn test_clear() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({"clear": true})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server).clear().await.unwrap();
        server.verify().await;
    }

    #[tokio::test]
    async fn test_batch_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad record"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .batch(&BatchRequest::Unindex(Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Http { status: 400, ref body } if body == "bad record"));
    }
}
