//! Single call-graph operations through a connected client.

use std::time::Duration;

use callscout_lsp::{CallGraph, ErrorCode, HandshakeState, LspError};
use callscout_types::SymbolRef;

use crate::common::{Node, connect, trident_script, trident_tree};

fn at(node: &Node) -> SymbolRef {
    SymbolRef::new(node.path.clone(), node.at.line, node.at.character)
}

#[tokio::test]
async fn handshake_waits_for_loaded_packages() {
    let tree = trident_tree();
    let (graph, _server) = connect(trident_script(&tree), tree.root()).await;
    assert_eq!(graph.readiness(), HandshakeState::Ready);
    assert_eq!(graph.server_info().name.as_deref(), Some("scripted-gopls"));
    assert!(graph.server_info().supports("callHierarchyProvider"));
}

#[tokio::test]
async fn outgoing_calls_report_callee_packages() {
    let tree = trident_tree();
    let script = trident_script(&tree);
    let caller = at(script.get("RestClient.VolumeCreate"));
    let (graph, server) = connect(script, tree.root()).await;

    let calls = graph.outgoing_calls(&caller).await.unwrap();
    let names: Vec<_> = calls.iter().map(|c| c.to.name.as_str()).collect();
    assert_eq!(names, ["Logc", "VolumeCreate"]);
    assert!(calls[0].to.detail().contains("trident/logging"));
    assert!(calls[1].to.detail().contains("ontap/api/rest/client"));
    assert!(server.asked("textDocument/prepareCallHierarchy", "RestClient.VolumeCreate"));
    assert!(server.asked("callHierarchy/outgoingCalls", "RestClient.VolumeCreate"));
}

#[tokio::test]
async fn prepare_on_a_blank_position_is_empty() {
    let tree = trident_tree();
    let (graph, _server) = connect(trident_script(&tree), tree.root()).await;
    let nowhere = SymbolRef::new(tree.path("storage_drivers/ontap/ontap_nas.go"), 1, 0);

    let err = graph.outgoing_calls(&nowhere).await.unwrap_err();
    assert!(err.is_empty_result());
}

#[tokio::test]
async fn server_errors_carry_their_code() {
    let tree = trident_tree();
    let script = trident_script(&tree).fail("NASDriver.ResizeVolume", -32803, "no metadata");
    let target = at(script.get("NASDriver.ResizeVolume"));
    let (graph, _server) = connect(script, tree.root()).await;

    let err = graph.outgoing_calls(&target).await.unwrap_err();
    assert!(matches!(err, LspError::Protocol { .. }));
    assert_eq!(err.code(), Some(ErrorCode::RequestFailed));
}

#[tokio::test]
async fn implementations_list_every_implementer() {
    let tree = trident_tree();
    let script = trident_script(&tree);
    let method = at(script.get("OntapAPI.VolumeDestroy"));
    let (graph, _server) = connect(script, tree.root()).await;

    let mut paths: Vec<_> = graph
        .implementations(&method)
        .await
        .unwrap()
        .iter()
        .map(|l| l.path().unwrap())
        .collect();
    paths.sort();
    assert_eq!(
        paths,
        [
            tree.path("storage_drivers/ontap/api/abstraction_rest.go"),
            tree.path("storage_drivers/ontap/api/mocks/mock_api.go"),
        ]
    );
}

#[tokio::test]
async fn references_find_callers() {
    let tree = trident_tree();
    let script = trident_script(&tree);
    let callee = at(script.get("RestClient.VolumeDelete"));
    let caller = script.get("OntapAPIREST.VolumeDestroy").clone();
    let (graph, _server) = connect(script, tree.root()).await;

    let refs = graph.references(&callee).await.unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].symbol().unwrap(), at(&caller));
}

#[tokio::test]
async fn hover_and_symbols() {
    let tree = trident_tree();
    let script = trident_script(&tree);
    let create = at(script.get("NASDriver.CreateVolume"));
    let (graph, _server) = connect(script, tree.root()).await;

    let hover = graph.hover(&create).await.unwrap().unwrap();
    assert_eq!(hover.text(), "func NASDriver.CreateVolume");

    let client = tree.path("storage_drivers/ontap/api/rest/client/volume/volume_client.go");
    let symbols = graph.document_symbols(&client).await.unwrap();
    let names: Vec<_> = symbols.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["VolumeCreate", "VolumeDelete", "VolumeModify"]);
}

#[tokio::test]
async fn queries_in_flight_resolve_independently() {
    let tree = trident_tree();
    let script = trident_script(&tree)
        .delay("NASDriver.CreateVolume", Duration::from_millis(30));
    let slow = at(script.get("NASDriver.CreateVolume"));
    let fast = at(script.get("NASDriver.DeleteVolume"));
    let (graph, _server) = connect(script, tree.root()).await;

    let slow = graph.hover(&slow);
    let fast = graph.hover(&fast);
    assert_eq!(fast.await.unwrap().unwrap().text(), "func NASDriver.DeleteVolume");
    assert_eq!(slow.await.unwrap().unwrap().text(), "func NASDriver.CreateVolume");
    assert_eq!(graph.outstanding().await, 0);
}

#[tokio::test]
async fn shutdown_ends_the_session() {
    let tree = trident_tree();
    let (graph, server) = connect(trident_script(&tree), tree.root()).await;

    graph.shutdown().await.unwrap();
    let requests = server.finished().await;
    assert_eq!(requests, ["shutdown", "exit"]);
}
