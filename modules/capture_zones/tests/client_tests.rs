//! Native client tests: result envelopes, admin command lines, shops and stats

mod common;

use capture_zones::api::native::NativeClient;
use capture_zones::{CaptureState, CaptureZonesActionResult, CaptureZonesApi, DataValue, PlayerId, API_VERSION};
use common::{ids, print_test_header, TestRig};
use std::sync::Arc;

fn client_for(rig: &TestRig) -> NativeClient {
    NativeClient::new(rig.service.clone())
}

fn number(result: &CaptureZonesActionResult, key: &str) -> f64 {
    result
        .get(key)
        .and_then(DataValue::as_f64)
        .unwrap_or_else(|| panic!("missing numeric '{}' in {:?}", key, result))
}

fn text<'a>(result: &'a CaptureZonesActionResult, key: &str) -> &'a str {
    result
        .get(key)
        .and_then(DataValue::as_str)
        .unwrap_or_else(|| panic!("missing text '{}' in {:?}", key, result))
}

async fn run(client: &NativeClient, line: &str) -> CaptureZonesActionResult {
    let result = client.run_admin_command(line).await;
    println!("   > {} => success={} message={}", line, result.success, result.message);
    result
}

#[tokio::test]
async fn test_versions_and_capabilities() {
    print_test_header(
        "test_versions_and_capabilities",
        &["API version is the contract version, plugin version is the build"],
    );
    let rig = TestRig::new();
    let client = client_for(&rig);

    assert_eq!(client.api_version(), API_VERSION);
    assert_eq!(client.plugin_version(), "test-build");
    let capabilities = client.capabilities();
    assert!(capabilities.contains(&"koth"));
    assert!(capabilities.contains(&"admin-commands"));

    let overview = client.overview_snapshot().await;
    assert_eq!(overview.api_version, API_VERSION);
    assert_eq!(overview.zones, 0);
}

#[tokio::test]
async fn test_errors_become_failed_results() {
    print_test_header(
        "test_errors_become_failed_results",
        &[
            "Domain errors never escape the client",
            "Failed results carry an error code and the target id",
        ],
    );
    let rig = TestRig::new();
    let client = client_for(&rig);

    let result = client.force_capture("ghost", "Steve").await;
    assert!(!result.success);
    assert_eq!(text(&result, "error"), "not_found");
    assert_eq!(text(&result, "resource"), "zone");
    assert_eq!(text(&result, "id"), "ghost");

    let result = client
        .set_global_config_value("reward.base", DataValue::from("lots"), false)
        .await;
    assert!(!result.success);
    assert_eq!(text(&result, "error"), "schema_mismatch");
    assert_eq!(text(&result, "path"), "reward.base");

    let result = client.remove_player_stats("Nobody").await;
    assert!(result.success);
    assert_eq!(result.get("removed"), Some(&DataValue::Bool(false)));
}

#[tokio::test]
async fn test_admin_command_session() {
    print_test_header(
        "test_admin_command_session",
        &[
            "Drive a full session through admin command lines",
            "zone create, capture force/reset, koth start/stop, config set/reset",
        ],
    );
    let rig = TestRig::new();
    let client = client_for(&rig);

    println!("📝 Stage 1: Creating zones");
    let result = run(&client, "zone create A1 world point 0 64 0 2 50").await;
    assert!(result.success, "{}", result.message);
    assert_eq!(text(&result, "zone_id"), "A1");
    assert_eq!(text(&result, "state"), "IDLE");
    let result = run(&client, "zone create B2 world cuboid 100 0 100 120 80 120").await;
    assert!(result.success, "{}", result.message);
    assert_eq!(text(&result, "shape"), "cuboid");

    println!("📝 Stage 2: Capturing and resetting");
    let result = run(&client, "capture force A1 Steve").await;
    assert!(result.success);
    assert_eq!(text(&result, "owner"), "Steve");
    assert_eq!(number(&result, "reward"), 50.0);

    let result = run(&client, "capture reset all").await;
    assert!(result.success);
    assert_eq!(number(&result, "changed"), 1.0);
    assert_eq!(number(&result, "unchanged"), 1.0);

    println!("📝 Stage 3: KOTH");
    let result = run(&client, "koth start A1,B2 silent").await;
    assert!(result.success, "{}", result.message);
    assert_eq!(result.get("announce"), Some(&DataValue::Bool(false)));
    assert_eq!(client.koth_snapshot().await.members, ids(&["A1", "B2"]));

    let result = run(&client, "koth stop all").await;
    assert!(result.success);
    assert_eq!(number(&result, "changed"), 2.0);
    assert_eq!(text(&result, "reason"), "manual");
    assert!(!client.koth_snapshot().await.running);

    println!("📝 Stage 4: Config");
    let result = run(&client, "config set A1 capture.time-seconds 5").await;
    assert!(result.success, "{}", result.message);
    assert_eq!(
        client.zone_config_snapshot("A1").await.get("capture.time-seconds"),
        Some(&DataValue::Number(5.0))
    );
    let result = run(&client, "config set global messages.prefix Arena >").await;
    assert!(result.success, "{}", result.message);
    assert_eq!(
        client.global_config_snapshot().await.get("messages.prefix"),
        Some(&DataValue::from("Arena >"))
    );
    let result = run(&client, "config reset A1 capture.time-seconds").await;
    assert!(result.success);
    assert_eq!(result.get("changed"), Some(&DataValue::Bool(true)));
    assert_eq!(
        client.zone_config_snapshot("A1").await.get("capture.time-seconds"),
        Some(&DataValue::Number(30.0))
    );

    println!("📝 Stage 5: Deleting");
    let result = run(&client, "zone delete B2").await;
    assert!(result.success);
    let zones = client.zones_snapshot().await;
    assert_eq!(zones.len(), 1);
    assert_eq!(zones[0].zone.id, "A1");
}

#[tokio::test]
async fn test_admin_command_rejections() {
    print_test_header(
        "test_admin_command_rejections",
        &["Unparseable lines fail with invalid_command and change nothing"],
    );
    let rig = TestRig::new();
    let client = client_for(&rig);

    for line in [
        "",
        "teleport A1",
        "zone create A1 world point 0 64 0",
        "zone create A1 world sphere 0 64 0 2",
        "zone limits A1 one 2",
        "koth assign A1 maybe",
        "stats reset now",
    ] {
        let result = run(&client, line).await;
        assert!(!result.success, "'{}' should be rejected", line);
        assert_eq!(text(&result, "error"), "invalid_command", "line '{}'", line);
    }
    assert!(client.zones_snapshot().await.is_empty());

    let result = run(&client, "capture force A1 Steve").await;
    assert!(!result.success);
    assert_eq!(text(&result, "error"), "not_found");
}

#[tokio::test]
async fn test_reload_lang_reaches_announcer() {
    print_test_header("test_reload_lang_reaches_announcer", &["reload lang re-reads message templates"]);
    let rig = TestRig::new();
    let client = client_for(&rig);

    let result = run(&client, "reload lang").await;
    assert!(result.success);
    assert_eq!(rig.announcer.reloads(), 1);

    let result = run(&client, "reload").await;
    assert!(result.success, "{}", result.message);
}

#[tokio::test]
async fn test_shop_lifecycle() {
    print_test_header(
        "test_shop_lifecycle",
        &[
            "Every zone gets a shop, enabled by default",
            "shop.items overrides feed the catalog",
            "Restocking a disabled shop is an invalid state unless allowed",
        ],
    );
    let rig = TestRig::new();
    let client = client_for(&rig);
    rig.point_zone("A1", 0.0, 0.0, 0.0).await;

    println!("📝 Stage 1: Catalog from config");
    let items = DataValue::List(vec![DataValue::from("DIAMOND:100"), DataValue::from("BREAD: 2.5")]);
    let result = client.set_zone_config_value("A1", "shop.items", items).await;
    assert!(result.success, "{}", result.message);
    let shops = client.shops_snapshot().await;
    assert_eq!(shops.len(), 1);
    assert!(shops[0].enabled);
    assert_eq!(shops[0].catalog.len(), 2);
    assert_eq!(shops[0].catalog[1].item, "BREAD");
    assert_eq!(shops[0].catalog[1].price, 2.5);

    let bad = DataValue::List(vec![DataValue::from("DIAMOND")]);
    let result = client.set_zone_config_value("A1", "shop.items", bad).await;
    assert_eq!(text(&result, "error"), "schema_mismatch");

    println!("📝 Stage 2: Restock rules");
    assert!(client.shop_restock("A1").await.success);
    let result = client.shop_set_enabled("A1", false).await;
    assert_eq!(result.get("changed"), Some(&DataValue::Bool(true)));
    let result = client.shop_restock("A1").await;
    assert_eq!(text(&result, "error"), "invalid_state");

    let result = client
        .set_zone_config_value("A1", "shop.restock-while-disabled", DataValue::Bool(true))
        .await;
    assert!(result.success);
    let result = client.shop_restock("A1").await;
    assert!(result.success, "{}", result.message);
    assert!(client.shops_snapshot().await[0].last_restock.is_some());

    println!("📝 Stage 3: Bulk reload");
    let result = client.shop_reload_all().await;
    assert!(result.success);
    assert_eq!(number(&result, "changed"), 1.0);

    let result = client.shop_restock("missing").await;
    assert_eq!(text(&result, "resource"), "shop");
}

#[tokio::test]
async fn test_statistics_accumulate() {
    print_test_header(
        "test_statistics_accumulate",
        &["Captures and rewards accumulate per player", "Snapshot orders players by captures"],
    );
    let rig = TestRig::new();
    let client = client_for(&rig);
    rig.point_zone("A1", 0.0, 0.0, 10.0).await;
    rig.point_zone("B2", 500.0, 0.0, 4.0).await;

    client.force_capture("A1", "Steve").await;
    client.force_capture("B2", "Steve").await;
    client.force_capture("A1", "Alex").await;

    let stats = client.statistics_snapshot().await;
    assert_eq!(stats.total_captures, 3);
    assert_eq!(stats.total_rewards, 24.0);
    assert_eq!(stats.players[0].player, PlayerId::from("Steve"));
    assert_eq!(stats.players[0].captures, 2);
    assert_eq!(stats.players[0].reward_total, 14.0);

    let result = client.reset_all_stats().await;
    assert_eq!(number(&result, "removed"), 2.0);
    assert!(client.statistics_snapshot().await.players.is_empty());
}

#[tokio::test]
async fn test_concurrent_commands_keep_invariants() {
    print_test_header(
        "test_concurrent_commands_keep_invariants",
        &[
            "Captures racing resets and KOTH changes never leave an owner outside CAPTURED",
            "Zone KOTH flags match session membership afterwards",
        ],
    );
    let rig = TestRig::new();
    for (i, id) in ["A1", "B2", "C3"].iter().enumerate() {
        rig.point_zone(id, i as f64 * 500.0, 0.0, 1.0).await;
    }
    let client = Arc::new(client_for(&rig));

    let mut handles = Vec::new();
    for round in 0..20 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let zone = ["A1", "B2", "C3"][round % 3];
            client.force_capture(zone, &format!("player{}", round)).await;
            client.reset_all_points().await;
            client.stop_capture(zone, "race").await;
            client.koth_assign_zone(zone, round % 2 == 0).await;
        }));
    }
    for handle in handles {
        handle.await.expect("task finished");
    }

    let members = client.koth_snapshot().await.members;
    for snapshot in client.zones_snapshot().await {
        let captured = matches!(snapshot.state, CaptureState::Captured { .. });
        assert_eq!(snapshot.state.owner().is_some(), captured);
        assert_eq!(snapshot.koth_member, members.contains(&snapshot.zone.id));
    }
    assert_eq!(client.statistics_snapshot().await.total_captures, 20);
}
