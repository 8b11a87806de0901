//! Integration tests for deleting manifests against a mock Kubernetes API server.

use assert_matches::assert_matches;
use k8s_mock::{HttpMockK8sServer, RunningHttpMockK8sServer};
use k8s_resource::{
	delete_file, ClusterConnection, DeleteOutcome, DocumentError, FileOpError, ResourceEngine,
	ResourceError, YamlError,
};

async fn engine_for(server: &RunningHttpMockK8sServer) -> ResourceEngine {
	let connection = ClusterConnection::from_kubeconfig(server.kubeconfig(), None)
		.await
		.expect("failed to create connection");
	ResourceEngine::builder()
		.client(connection.client().clone())
		.build()
}

#[tokio::test]
async fn test_delete_existing_resource() {
	let server = HttpMockK8sServer::builder()
		.resources(vec![serde_json::json!({
			"apiVersion": "v1",
			"kind": "Secret",
			"metadata": {"name": "test-secret", "namespace": "default"}
		})])
		.build()
		.start()
		.await;
	let mut engine = engine_for(&server).await;

	let deleted = delete_file(&mut engine, "tests/testdata/secret.yaml")
		.await
		.expect("delete should succeed");

	assert_eq!(deleted[0].outcome, DeleteOutcome::Deleted);
	assert_eq!(
		server.resource_calls().await,
		vec!["DELETE /api/v1/namespaces/default/secrets/test-secret"]
	);
	assert!(server
		.resource("/api/v1/namespaces/default/secrets", "test-secret")
		.is_none());
}

#[tokio::test]
async fn test_delete_nonexistent_resource() {
	let server = HttpMockK8sServer::builder().build().start().await;
	let mut engine = engine_for(&server).await;

	let deleted = delete_file(&mut engine, "tests/testdata/secret.yaml")
		.await
		.expect("deleting a missing resource should succeed");

	assert_eq!(deleted[0].outcome, DeleteOutcome::NotFound);
}

#[tokio::test]
async fn test_delete_in_missing_namespace() {
	let server = HttpMockK8sServer::builder().build().start().await;
	let mut engine = engine_for(&server).await;

	let deleted = delete_file(&mut engine, "tests/testdata/secret_bad_namespace.yaml")
		.await
		.expect("deleting from a missing namespace should succeed");

	assert_eq!(deleted[0].outcome, DeleteOutcome::NotFound);
	// No namespace lookup happens before a delete.
	assert_eq!(
		server.resource_calls().await,
		vec!["DELETE /api/v1/namespaces/does-not-exist/secrets/test-secret"]
	);
}

#[tokio::test]
async fn test_delete_multiple_documents() {
	let server = HttpMockK8sServer::builder()
		.resources(vec![serde_json::json!({
			"apiVersion": "rbac.authorization.k8s.io/v1",
			"kind": "ClusterRole",
			"metadata": {"name": "app-reader"}
		})])
		.build()
		.start()
		.await;
	let mut engine = engine_for(&server).await;

	let deleted = delete_file(&mut engine, "tests/testdata/multi_resource.yaml")
		.await
		.expect("delete should succeed");

	let outcomes: Vec<_> = deleted.iter().map(|r| r.outcome).collect();
	assert_eq!(
		outcomes,
		vec![
			DeleteOutcome::NotFound,
			DeleteOutcome::Deleted,
			DeleteOutcome::NotFound,
		]
	);
	assert_eq!(
		server.resource_calls().await,
		vec![
			"DELETE /api/v1/namespaces/default/configmaps/app-config",
			"DELETE /apis/rbac.authorization.k8s.io/v1/clusterroles/app-reader",
			"DELETE /api/v1/namespaces/default/secrets/app-secret",
		]
	);
}

#[tokio::test]
async fn test_delete_invalid_yaml() {
	let server = HttpMockK8sServer::builder().build().start().await;
	let mut engine = engine_for(&server).await;

	let result = delete_file(&mut engine, "tests/testdata/secret_invalid.yaml").await;

	assert_matches!(
		result,
		Err(FileOpError::Document {
			source: DocumentError {
				index: 0,
				completed: 0,
				source: ResourceError::Yaml(YamlError::Parse { .. }),
			},
			..
		})
	);
	assert!(server.resource_calls().await.is_empty());
}
