//! End-to-end breakout runs against an in-memory CONFIG_DB.

use pretty_assertions::assert_eq;
use sonic_config_db::{ConfigReader, MemoryConfigStore, RowRef};
use sonic_dpb::{
    AutoConfirm, BreakoutDescriptor, BreakoutOutcome, BreakoutRequest, DpbConfig, DpbError, Phase,
    SafetySequencer, SequencerOptions, TableRegistry, EXIT_ABORTED, EXIT_PARTIAL_APPLY,
};
use sonic_dpb_test::{
    dependency_fixtures, port_fixtures, two_port_descriptor_json, JournalVerifier, RowFixture,
    StoreVerifier, TestScenario,
};

const SINGLE: &str = "1x100G[40G]";
const QUAD: &str = "4x25G[10G]";
const DUAL: &str = "2x50G";
const MIXED: &str = "1x50G(2)+2x25G(2)";

fn descriptor() -> BreakoutDescriptor {
    BreakoutDescriptor::from_json(&two_port_descriptor_json()).unwrap()
}

async fn run(
    store: &MemoryConfigStore,
    request: BreakoutRequest,
    confirm: bool,
    options: SequencerOptions,
) -> (Result<BreakoutOutcome, DpbError>, Vec<Phase>) {
    let descriptor = descriptor();
    let registry = TableRegistry::builtin();
    let confirmer = AutoConfirm(confirm);
    let mut sequencer =
        SafetySequencer::new(&descriptor, &registry, store, &confirmer).with_options(options);
    let result = sequencer.run(&request).await;
    (result, sequencer.history().to_vec())
}

#[test]
fn test_fixture_descriptor_partitions_every_mode() {
    let descriptor = descriptor();
    for port in descriptor.ports() {
        let group = descriptor.group(port).unwrap();
        for mode in group.supported_modes() {
            let mut lanes: Vec<u32> = descriptor
                .resolve(port, &mode)
                .unwrap()
                .iter()
                .flat_map(|c| c.lanes.iter().copied())
                .collect();
            lanes.sort_unstable();
            assert_eq!(lanes, group.lanes, "{} {}", port, mode);
        }
    }
}

#[tokio::test]
async fn test_single_to_quad() {
    let store = TestScenario::ethernet0_single().store();
    let options = SequencerOptions {
        new_port_admin_status: "up".to_string(),
        ..Default::default()
    };

    let (result, history) = run(
        &store,
        BreakoutRequest::new("Ethernet0", QUAD).with_assume_yes(true),
        false,
        options,
    )
    .await;

    let BreakoutOutcome::Done(summary) = result.unwrap() else {
        panic!("expected a completed breakout");
    };
    assert_eq!(summary.plan.delete_names(), vec!["Ethernet0"]);
    assert_eq!(
        summary.plan.add_names(),
        vec!["Ethernet0", "Ethernet1", "Ethernet2", "Ethernet3"]
    );
    assert!(summary.plan.preserved.is_empty());
    assert_eq!(history.last(), Some(&Phase::Done));

    let verifier = StoreVerifier::new(&store);
    verifier
        .assert_keys("PORT", &["Ethernet0", "Ethernet1", "Ethernet2", "Ethernet3"])
        .await
        .unwrap();
    verifier
        .assert_field_value("PORT", "Ethernet1", "lanes", "66")
        .await
        .unwrap();
    verifier
        .assert_field_value("PORT", "Ethernet1", "alias", "Eth1/2")
        .await
        .unwrap();
    verifier
        .assert_field_value("PORT", "Ethernet3", "speed", "25000")
        .await
        .unwrap();
    verifier
        .assert_field_value("PORT", "Ethernet3", "admin_status", "up")
        .await
        .unwrap();
    verifier
        .assert_field_value("BREAKOUT_CFG", "Ethernet0", "brkout_mode", QUAD)
        .await
        .unwrap();

    let journal = JournalVerifier::of(&store).await;
    journal.assert_quiesced_before_delete(&["Ethernet0"]).unwrap();
    journal
        .assert_written_before_up(&["Ethernet0", "Ethernet1", "Ethernet2", "Ethernet3"])
        .unwrap();
    journal.assert_last_write("BREAKOUT_CFG", "Ethernet0").unwrap();
}

#[tokio::test]
async fn test_same_mode_is_noop() {
    let store = TestScenario::ethernet0_quad().store();

    let (result, history) = run(
        &store,
        BreakoutRequest::new("Ethernet0", QUAD),
        false,
        SequencerOptions::default(),
    )
    .await;

    assert!(matches!(result, Ok(BreakoutOutcome::NoOp { .. })));
    assert_eq!(history, vec![Phase::Validate, Phase::Abort]);
    JournalVerifier::of(&store).await.assert_no_mutations().unwrap();
}

#[tokio::test]
async fn test_quad_to_dual() {
    let store = TestScenario::ethernet0_quad().store();

    let (result, _) = run(
        &store,
        BreakoutRequest::new("Ethernet0", DUAL).with_assume_yes(true),
        false,
        SequencerOptions::default(),
    )
    .await;
    result.unwrap();

    let verifier = StoreVerifier::new(&store);
    verifier.assert_keys("PORT", &["Ethernet0", "Ethernet2"]).await.unwrap();
    verifier
        .assert_field_value("PORT", "Ethernet2", "lanes", "67,68")
        .await
        .unwrap();
    verifier
        .assert_field_value("PORT", "Ethernet0", "admin_status", "down")
        .await
        .unwrap();

    JournalVerifier::of(&store)
        .await
        .assert_quiesced_before_delete(&["Ethernet0", "Ethernet1", "Ethernet2", "Ethernet3"])
        .unwrap();
}

#[tokio::test]
async fn test_blocking_dependency_aborts_without_force() {
    let store = TestScenario::ethernet0_quad()
        .with_row(dependency_fixtures::vlan(100))
        .with_row(dependency_fixtures::vlan_member(100, "Ethernet2", "untagged"))
        .store();

    let (result, history) = run(
        &store,
        BreakoutRequest::new("Ethernet0", SINGLE).with_assume_yes(true),
        true,
        SequencerOptions::default(),
    )
    .await;

    let err = result.unwrap_err();
    match &err {
        DpbError::BlockingDependency { rows } => {
            assert_eq!(rows.0, vec![RowRef::new("VLAN_MEMBER", "Vlan100|Ethernet2")]);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(err.to_string().contains("VLAN_MEMBER|Vlan100|Ethernet2"));
    assert_eq!(err.exit_code(), EXIT_ABORTED);
    assert!(err.is_retryable());
    assert_eq!(
        history,
        vec![Phase::Validate, Phase::Quiesce, Phase::CheckDeps, Phase::Abort]
    );

    // The port set is unchanged; only the admin-down writes remain.
    let verifier = StoreVerifier::new(&store);
    verifier
        .assert_keys("PORT", &["Ethernet0", "Ethernet1", "Ethernet2", "Ethernet3"])
        .await
        .unwrap();
    verifier
        .assert_field_value("BREAKOUT_CFG", "Ethernet0", "brkout_mode", QUAD)
        .await
        .unwrap();
    verifier
        .assert_row_exists("VLAN_MEMBER", "Vlan100|Ethernet2")
        .await
        .unwrap();
    JournalVerifier::of(&store).await.assert_no_port_deleted().unwrap();
}

#[tokio::test]
async fn test_blocking_dependency_forced() {
    let store = TestScenario::ethernet0_quad()
        .with_row(dependency_fixtures::vlan(100))
        .with_row(dependency_fixtures::vlan_member(100, "Ethernet2", "untagged"))
        .with_row(dependency_fixtures::interface_ip("Ethernet1", "10.0.0.0/31"))
        .with_row(dependency_fixtures::acl_table("DATAACL", &["Ethernet3", "Ethernet4"]))
        .store();

    let (result, history) = run(
        &store,
        BreakoutRequest::new("Ethernet0", SINGLE)
            .with_force(true)
            .with_assume_yes(true),
        true,
        SequencerOptions::default(),
    )
    .await;

    let BreakoutOutcome::Done(summary) = result.unwrap() else {
        panic!("expected a completed breakout");
    };
    assert_eq!(history.last(), Some(&Phase::Done));
    assert_eq!(summary.forced.len(), 3);

    let verifier = StoreVerifier::new(&store);
    verifier.assert_keys("PORT", &["Ethernet0"]).await.unwrap();
    verifier
        .assert_row_absent("VLAN_MEMBER", "Vlan100|Ethernet2")
        .await
        .unwrap();
    verifier
        .assert_row_absent("INTERFACE", "Ethernet1|10.0.0.0/31")
        .await
        .unwrap();
    verifier
        .assert_field_value("ACL_TABLE", "DATAACL", "ports@", "Ethernet4")
        .await
        .unwrap();
    verifier.assert_row_exists("VLAN", "Vlan100").await.unwrap();
}

#[tokio::test]
async fn test_forced_detach_keeps_rows_shared_with_other_ports() {
    let store = TestScenario::ethernet0_quad()
        .with_row(port_fixtures::port_down("Ethernet4", "69,70,71,72", 100000))
        .with_row(port_fixtures::breakout_cfg("Ethernet4", SINGLE))
        .with_row(RowFixture::new("BUFFER_PG", "Ethernet0,Ethernet4|3-4").with_fields([
            ("profile", "pg_lossless_100000_5m_profile"),
        ]))
        .with_row(RowFixture::new("BUFFER_PG", "Ethernet1|3-4").with_fields([
            ("profile", "pg_lossless_25000_5m_profile"),
        ]))
        .store();

    let (result, _) = run(
        &store,
        BreakoutRequest::new("Ethernet0", DUAL)
            .with_force(true)
            .with_assume_yes(true),
        true,
        SequencerOptions::default(),
    )
    .await;

    let BreakoutOutcome::Done(summary) = result.unwrap() else {
        panic!("expected a completed breakout");
    };
    assert_eq!(summary.forced.len(), 2);

    let verifier = StoreVerifier::new(&store);
    verifier
        .assert_keys("BUFFER_PG", &["Ethernet4|3-4"])
        .await
        .unwrap();
    verifier
        .assert_field_value("BUFFER_PG", "Ethernet4|3-4", "profile", "pg_lossless_100000_5m_profile")
        .await
        .unwrap();
    verifier
        .assert_field_value("PORT", "Ethernet4", "admin_status", "down")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_configured_list_field_blocks_breakout() {
    let config: DpbConfig = toml::from_str(
        r#"
[[modeled_tables]]
name = "MY_APP_TABLE"
fields = ["peer_ports@"]
"#,
    )
    .unwrap();
    config.validate().unwrap();

    let store = TestScenario::ethernet0_quad()
        .with_row(dependency_fixtures::unmodeled("MY_APP_TABLE", "x", "peer_ports@", "Ethernet2"))
        .store();
    let descriptor = descriptor();
    let registry = config.registry();
    let confirmer = AutoConfirm(true);
    let mut sequencer = SafetySequencer::new(&descriptor, &registry, &store, &confirmer);

    let err = sequencer
        .run(&BreakoutRequest::new("Ethernet0", SINGLE).with_assume_yes(true))
        .await
        .unwrap_err();

    match &err {
        DpbError::BlockingDependency { rows } => {
            assert_eq!(rows.0, vec![RowRef::new("MY_APP_TABLE", "x")]);
        }
        other => panic!("unexpected error: {}", other),
    }
    StoreVerifier::new(&store)
        .assert_keys("PORT", &["Ethernet0", "Ethernet1", "Ethernet2", "Ethernet3"])
        .await
        .unwrap();
    JournalVerifier::of(&store).await.assert_no_port_deleted().unwrap();
}

#[tokio::test]
async fn test_preserved_ports_are_untouched() {
    let store = TestScenario::ethernet0_quad().store();

    let (result, _) = run(
        &store,
        BreakoutRequest::new("Ethernet0", MIXED).with_assume_yes(true),
        false,
        SequencerOptions::default(),
    )
    .await;

    let BreakoutOutcome::Done(summary) = result.unwrap() else {
        panic!("expected a completed breakout");
    };
    assert_eq!(summary.plan.preserved, vec!["Ethernet2", "Ethernet3"]);
    assert_eq!(summary.plan.delete_names(), vec!["Ethernet0", "Ethernet1"]);
    assert_eq!(summary.plan.add_names(), vec!["Ethernet0"]);

    let journal = JournalVerifier::of(&store).await;
    assert!(journal
        .ops()
        .iter()
        .all(|op| op.row().key != "Ethernet2" && op.row().key != "Ethernet3"));

    StoreVerifier::new(&store)
        .assert_field_value("PORT", "Ethernet2", "admin_status", "up")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unmodeled_reference_requires_confirmation() {
    let scenario = TestScenario::ethernet0_quad().with_row(dependency_fixtures::unmodeled(
        "MY_APP_TABLE",
        "monitor",
        "watch",
        "Ethernet1 Ethernet12",
    ));

    // Declined, even with --force and --yes.
    let store = scenario.store();
    let (result, _) = run(
        &store,
        BreakoutRequest::new("Ethernet0", SINGLE)
            .with_force(true)
            .with_assume_yes(true),
        false,
        SequencerOptions::default(),
    )
    .await;
    assert!(matches!(
        result,
        Err(DpbError::UnmodeledDependencyDeclined { .. })
    ));
    JournalVerifier::of(&store).await.assert_no_port_deleted().unwrap();

    // Accepted: the blob is left alone.
    let store = scenario.store();
    let (result, _) = run(
        &store,
        BreakoutRequest::new("Ethernet0", SINGLE).with_assume_yes(true),
        true,
        SequencerOptions::default(),
    )
    .await;
    let BreakoutOutcome::Done(summary) = result.unwrap() else {
        panic!("expected a completed breakout");
    };
    assert_eq!(summary.unverified, vec![RowRef::new("MY_APP_TABLE", "monitor")]);
    StoreVerifier::new(&store)
        .assert_row_exists("MY_APP_TABLE", "monitor")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_failure_after_delete_is_partial_apply() {
    let store = TestScenario::ethernet0_single()
        .store()
        .with_failing_row("PORT", "Ethernet2");

    let (result, history) = run(
        &store,
        BreakoutRequest::new("Ethernet0", QUAD).with_assume_yes(true),
        false,
        SequencerOptions::default(),
    )
    .await;

    let err = result.unwrap_err();
    match &err {
        DpbError::PartialApply {
            phase, completed, ..
        } => {
            assert_eq!(*phase, Phase::ApplyAdd);
            assert!(completed.contains(&"DEL PORT|Ethernet0".to_string()));
            assert!(completed.contains(&"SET PORT|Ethernet1".to_string()));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(!err.is_retryable());
    assert_eq!(err.exit_code(), EXIT_PARTIAL_APPLY);
    assert_eq!(history.last(), Some(&Phase::ApplyAdd));

    // The recorded mode was never changed.
    StoreVerifier::new(&store)
        .assert_field_value("BREAKOUT_CFG", "Ethernet0", "brkout_mode", SINGLE)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_missing_port_row_fails_quiesce() {
    let store = TestScenario::new("recorded mode without ports")
        .with_row(sonic_dpb_test::port_fixtures::breakout_cfg("Ethernet4", QUAD))
        .store();

    let (result, _) = run(
        &store,
        BreakoutRequest::new("Ethernet4", SINGLE).with_assume_yes(true),
        false,
        SequencerOptions::default(),
    )
    .await;

    assert!(matches!(result, Err(DpbError::QuiesceFailure { ref port, .. }) if port == "Ethernet4"));
    JournalVerifier::of(&store).await.assert_no_mutations().unwrap();
}

#[tokio::test]
async fn test_preview_is_pure() {
    let store = TestScenario::ethernet0_quad()
        .with_row(dependency_fixtures::vlan_member(100, "Ethernet2", "untagged"))
        .store();
    let before = store.snapshot().await;

    let descriptor = descriptor();
    let registry = TableRegistry::builtin();
    let sequencer = SafetySequencer::new(&descriptor, &registry, &store, &AutoConfirm(false));
    let preview = sequencer.preview("Ethernet0", DUAL).await.unwrap();

    assert_eq!(preview.plan.add_names(), vec!["Ethernet0", "Ethernet2"]);
    assert_eq!(preview.dependencies.modeled.len(), 1);
    assert_eq!(store.snapshot().await, before);
    JournalVerifier::of(&store).await.assert_no_mutations().unwrap();
}

#[tokio::test]
async fn test_configured_run_with_defaults_and_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("new_port_config.json");
    let config_path = dir.path().join("dpb.conf");
    std::fs::write(
        &config_path,
        format!(
            r#"
[breakout]
artifact_path = "{}"
default_mtu = 1500

[[port_defaults]]
table = "PORT_QOS_MAP"
key = "{{port}}"
fields = {{ pfc_enable = "3,4" }}
"#,
            artifact.display()
        ),
    )
    .unwrap();

    let config = DpbConfig::load_or_default(&config_path).unwrap();
    config.validate().unwrap();

    let store = TestScenario::ethernet0_quad().store();
    let descriptor = descriptor();
    let registry = config.registry();
    let defaults = config.port_defaults();
    let confirmer = AutoConfirm(true);
    let mut sequencer = SafetySequencer::new(&descriptor, &registry, &store, &confirmer)
        .with_defaults(&defaults)
        .with_options(config.sequencer_options());

    let outcome = sequencer
        .run(&BreakoutRequest::new("Ethernet0", DUAL).with_load_defaults(true))
        .await
        .unwrap();

    let BreakoutOutcome::Done(summary) = outcome else {
        panic!("expected a completed breakout");
    };
    assert_eq!(summary.artifact.as_deref(), Some(artifact.as_path()));

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&artifact).unwrap()).unwrap();
    assert_eq!(written["Ethernet2"]["lanes"], "67,68");
    assert_eq!(written["Ethernet0"]["speed"], "50000");

    let verifier = StoreVerifier::new(&store);
    verifier
        .assert_field_value("PORT_QOS_MAP", "Ethernet2", "pfc_enable", "3,4")
        .await
        .unwrap();
    verifier
        .assert_field_value("PORT", "Ethernet0", "mtu", "1500")
        .await
        .unwrap();
    assert_eq!(store.keys("PORT_QOS_MAP").await.unwrap().len(), 2);
}
