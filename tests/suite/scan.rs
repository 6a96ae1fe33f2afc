//! Whole traversals against the scripted server and a real Go tree.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use callscout_syntax::GoSyntaxIndex;
use callscout_traversal::{Flavor, Recurser, TraversalError, TraversalReport, discover_entries};
use callscout_types::{FunctionId, LookupError, SourcePoint};

use crate::common::{MODULE, connect, trident_script, trident_tree};

const REST_ENTRIES: &str = "storage_drivers/ontap/ontap_nas.go";
const ZAPI_ENTRIES: &str = "storage_drivers/ontap/ontap_san.go";

fn entries(root: &Path, pattern: &str, syntax: &GoSyntaxIndex) -> Vec<FunctionId> {
    discover_entries(root, &[pattern.to_string()], syntax).unwrap()
}

/// Entry name to the sorted `verb path` / `command` literals it reached.
fn found(report: &TraversalReport) -> BTreeMap<String, Vec<String>> {
    report
        .by_entry()
        .into_iter()
        .map(|(entry, literals)| {
            let mut literals: Vec<String> = literals.iter().map(|l| l.fields().join(" ")).collect();
            literals.sort();
            (entry.name().to_string(), literals)
        })
        .collect()
}

#[tokio::test]
async fn rest_scan_follows_interfaces_and_skips_mocks() {
    let tree = trident_tree();
    let script = trident_script(&tree).fail(
        "RestClient.VolumeResize",
        -32803,
        "no package metadata for file",
    );
    let (graph, server) = connect(script, tree.root()).await;
    let syntax = Arc::new(GoSyntaxIndex::new(tree.root()));

    let entries = entries(tree.root(), REST_ENTRIES, &syntax);
    let names: Vec<_> = entries.iter().map(FunctionId::name).collect();
    assert_eq!(names, ["CreateVolume", "DeleteVolume", "ResizeVolume"]);

    let report = Recurser::new(Arc::new(graph.clone()), syntax, Flavor::rest_endpoints())
        .run(entries)
        .await
        .unwrap();

    assert_eq!(
        found(&report),
        BTreeMap::from([
            ("CreateVolume".to_string(), vec!["POST /storage/volumes".to_string()]),
            (
                "DeleteVolume".to_string(),
                vec!["DELETE /storage/volumes/{uuid}".to_string()]
            ),
        ])
    );
    assert_eq!(report.stats().dead_ends, 1);
    assert_eq!(report.stats().interfaces, 1);

    // Filtered callees and mock implementations are never queried, and
    // terminals are read from source rather than expanded.
    assert!(!server.asked("textDocument/prepareCallHierarchy", "Logc"));
    assert!(!server.asked("textDocument/prepareCallHierarchy", "MockOntapAPI.VolumeDestroy"));
    assert!(!server.asked("textDocument/prepareCallHierarchy", "Client.VolumeCreate"));
    assert!(server.asked("textDocument/implementation", "OntapAPI.VolumeDestroy"));

    graph.shutdown().await.unwrap();
    let requests = server.finished().await;
    assert_eq!(requests.last().map(String::as_str), Some("exit"));
}

#[tokio::test]
async fn command_scan_reads_xml_tags_of_request_structs() {
    let tree = trident_tree();
    let (graph, server) = connect(trident_script(&tree), tree.root()).await;
    let syntax = Arc::new(GoSyntaxIndex::new(tree.root()));

    let entries = entries(tree.root(), ZAPI_ENTRIES, &syntax);
    let report = Recurser::new(Arc::new(graph.clone()), syntax, Flavor::commands())
        .run(entries)
        .await
        .unwrap();

    assert_eq!(
        found(&report),
        BTreeMap::from([(
            "CreateLun".to_string(),
            vec!["lun-create-by-size".to_string()]
        )])
    );
    let (terminal, finding) = report.findings().iter().next().unwrap();
    assert_eq!(terminal.name(), "ExecuteUsing");
    assert!(terminal.path().ends_with("azgo/api-lun-create.go"));
    let credited: Vec<_> = finding.entries().iter().map(FunctionId::name).collect();
    assert_eq!(credited, ["CreateLun"]);
    assert!(!server.asked("callHierarchy/outgoingCalls", "LunCreateBySizeRequest.ExecuteUsing"));
}

#[tokio::test]
async fn flavors_share_one_connection_concurrently() {
    let tree = trident_tree();
    let script = trident_script(&tree)
        .delay("NASDriver.CreateVolume", Duration::from_millis(40))
        .delay("RestClient.VolumeDelete", Duration::from_millis(25))
        .delay("Client.LunCreate", Duration::from_millis(10));
    let (graph, _server) = connect(script, tree.root()).await;
    let syntax = Arc::new(GoSyntaxIndex::new(tree.root()));

    let rest = Recurser::new(
        Arc::new(graph.clone()),
        syntax.clone(),
        Flavor::rest_endpoints(),
    )
    .launch(entries(tree.root(), REST_ENTRIES, &syntax));
    let commands = Recurser::new(Arc::new(graph.clone()), syntax.clone(), Flavor::commands())
        .launch(entries(tree.root(), ZAPI_ENTRIES, &syntax));

    let rest = tokio::time::timeout(Duration::from_secs(10), rest)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let commands = tokio::time::timeout(Duration::from_secs(10), commands)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(
        found(&rest),
        BTreeMap::from([
            ("CreateVolume".to_string(), vec!["POST /storage/volumes".to_string()]),
            (
                "DeleteVolume".to_string(),
                vec!["DELETE /storage/volumes/{uuid}".to_string()]
            ),
            (
                "ResizeVolume".to_string(),
                vec!["PATCH /storage/volumes/{uuid}".to_string()]
            ),
        ])
    );
    assert_eq!(rest.stats().dead_ends, 0);
    assert!(commands.extracted().all(|e| e.as_command().is_some()));
    assert_eq!(commands.findings().len(), 1);
    assert_eq!(graph.outstanding().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shared_client_call_is_credited_to_every_driver_method() {
    let tree = trident_tree();
    let script = trident_script(&tree)
        .call("NASDriver.ResizeVolume", "RestClient.VolumeCreate")
        .delay("NASDriver.CreateVolume", Duration::from_millis(30));
    let (graph, _server) = connect(script, tree.root()).await;
    let syntax = Arc::new(GoSyntaxIndex::new(tree.root()));

    let report = Recurser::new(Arc::new(graph.clone()), syntax.clone(), Flavor::rest_endpoints())
        .run(entries(tree.root(), REST_ENTRIES, &syntax))
        .await
        .unwrap();

    let grouped = found(&report);
    assert_eq!(grouped["CreateVolume"], ["POST /storage/volumes"]);
    assert_eq!(
        grouped["ResizeVolume"],
        ["PATCH /storage/volumes/{uuid}", "POST /storage/volumes"]
    );
}

#[tokio::test]
async fn run_aborts_when_a_callee_lies_outside_the_workspace() {
    let tree = trident_tree();
    let outside = Path::new("/callscout-missing/vendor/ontap/api/ghost.go");
    let script = trident_script(&tree)
        .node(
            "Ghost.Do",
            "Do",
            outside,
            SourcePoint::new(3, 6),
            &format!("{MODULE}/storage_drivers/ontap/api • ghost.go"),
            6,
        )
        .call("NASDriver.CreateVolume", "Ghost.Do");
    let (graph, _server) = connect(script, tree.root()).await;
    let syntax = Arc::new(GoSyntaxIndex::new(tree.root()));

    let err = Recurser::new(Arc::new(graph.clone()), syntax.clone(), Flavor::rest_endpoints())
        .run(entries(tree.root(), REST_ENTRIES, &syntax))
        .await
        .unwrap_err();

    match &err {
        TraversalError::Lookup(LookupError::NotIndexed { path }) => assert_eq!(path, outside),
        other => panic!("expected a lookup failure, got {other:?}"),
    }
}

#[tokio::test]
async fn depth_ceiling_stops_before_terminals() {
    let tree = trident_tree();
    let (graph, _server) = connect(trident_script(&tree), tree.root()).await;
    let syntax = Arc::new(GoSyntaxIndex::new(tree.root()));

    let mut shallow = Flavor::rest_endpoints();
    shallow.max_depth = 1;
    let report = Recurser::new(Arc::new(graph.clone()), syntax.clone(), shallow)
        .run(entries(tree.root(), REST_ENTRIES, &syntax))
        .await
        .unwrap();

    assert!(report.is_empty());
    assert!(report.stats().depth_cutoffs > 0);
}
