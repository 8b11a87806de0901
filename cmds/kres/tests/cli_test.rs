//! Integration tests for the command handlers using a mock Kubernetes API server.

use assert_matches::assert_matches;
use k8s_mock::HttpMockK8sServer;
use kres::commands::{
	apply::apply_manifests,
	delete::delete_manifests,
	patch::{patch_resource, PatchArgs, PatchFormat},
	ConnectionArgs,
};
use k8s_resource::{ApplyOutcome, DeleteOutcome, GroupVersionResource};

#[tokio::test]
async fn test_apply_then_delete() {
	let server = HttpMockK8sServer::builder().build().start().await;
	let dir = tempfile::tempdir().unwrap();
	let kubeconfig = dir.path().join("kubeconfig");
	server.write_kubeconfig(&kubeconfig).unwrap();

	let args = ConnectionArgs {
		kubeconfig: Some(kubeconfig),
		..Default::default()
	};
	let connection = args.connect().await.expect("connection should succeed");
	let mut engine = args.engine(&connection);

	let mut output = Vec::new();
	let applied = apply_manifests(
		&mut engine,
		"tests/testdata/configmap.yaml".as_ref(),
		&mut output,
	)
	.await
	.expect("apply should succeed");
	assert!(applied.iter().all(|r| r.outcome == ApplyOutcome::Created));
	assert_eq!(
		String::from_utf8(output).unwrap(),
		"ConfigMap default/kres-config created\nClusterRole kres-reader created\n"
	);

	let mut output = Vec::new();
	let deleted = delete_manifests(
		&mut engine,
		"tests/testdata/configmap.yaml".as_ref(),
		&mut output,
	)
	.await
	.expect("delete should succeed");
	assert!(deleted.iter().all(|r| r.outcome == DeleteOutcome::Deleted));
	assert_eq!(
		String::from_utf8(output).unwrap(),
		"ConfigMap default/kres-config deleted\nClusterRole kres-reader deleted\n"
	);
}

#[tokio::test]
async fn test_apply_with_namespace_flag() {
	let server = HttpMockK8sServer::builder()
		.namespaces(vec!["team-a".to_string()])
		.build()
		.start()
		.await;
	let dir = tempfile::tempdir().unwrap();
	let kubeconfig = dir.path().join("kubeconfig");
	server.write_kubeconfig(&kubeconfig).unwrap();

	let args = ConnectionArgs {
		kubeconfig: Some(kubeconfig),
		namespace: Some("team-a".to_string()),
		..Default::default()
	};
	let connection = args.connect().await.unwrap();
	let mut engine = args.engine(&connection);

	apply_manifests(
		&mut engine,
		"tests/testdata/configmap.yaml".as_ref(),
		std::io::sink(),
	)
	.await
	.unwrap();

	assert!(server
		.resource("/api/v1/namespaces/team-a/configmaps", "kres-config")
		.is_some());
}

#[tokio::test]
async fn test_patch_command() {
	let server = HttpMockK8sServer::builder()
		.resources(vec![serde_json::json!({
			"apiVersion": "v1",
			"kind": "ConfigMap",
			"metadata": {"name": "kres-config", "namespace": "default"},
			"data": {"mode": "test"}
		})])
		.build()
		.start()
		.await;
	let dir = tempfile::tempdir().unwrap();
	let kubeconfig = dir.path().join("kubeconfig");
	server.write_kubeconfig(&kubeconfig).unwrap();

	let args = ConnectionArgs {
		kubeconfig: Some(kubeconfig),
		..Default::default()
	};
	let connection = args.connect().await.unwrap();
	let engine = args.engine(&connection);

	let patch = PatchArgs {
		file: "tests/testdata/labels.yaml".into(),
		resource: GroupVersionResource::new("", "v1", "configmaps"),
		name: "kres-config".to_string(),
		cluster_scoped: false,
		patch_type: PatchFormat::Merge,
	};
	let mut output = Vec::new();
	patch_resource(&engine, &patch, Some("default"), &mut output)
		.await
		.expect("patch should succeed");

	assert_eq!(
		String::from_utf8(output).unwrap(),
		"configmaps default/kres-config patched\n"
	);
	let stored = server
		.resource("/api/v1/namespaces/default/configmaps", "kres-config")
		.unwrap();
	assert_eq!(stored["metadata"]["labels"]["owner"], "kres");
}

#[tokio::test]
async fn test_connect_with_missing_context() {
	let server = HttpMockK8sServer::builder().build().start().await;
	let dir = tempfile::tempdir().unwrap();
	let kubeconfig = dir.path().join("kubeconfig");
	server.write_kubeconfig(&kubeconfig).unwrap();

	let args = ConnectionArgs {
		kubeconfig: Some(kubeconfig),
		context: Some("production".to_string()),
		..Default::default()
	};
	let err = args.connect().await.unwrap_err();

	assert_matches!(
		err.downcast_ref::<k8s_resource::ConnectionError>(),
		Some(k8s_resource::ConnectionError::ContextNotFound(_))
	);
}
