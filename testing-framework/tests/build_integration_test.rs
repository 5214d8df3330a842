// Integration tests for building a topology end to end on local collaborators

mod common;

use common::*;
use interchain_testing_framework::prelude::*;
use interchain_testing_framework::reporter::BuildReport;

#[tokio::test(start_paused = true)]
async fn test_ics20_transfer_between_two_chains() {
    init_logger();
    let (mut ic, fx) = two_chains();

    ic.build(BuildOptions::new("ics20_transfer")).await.unwrap();
    assert_eq!(ic.phase(), Phase::Built);
    assert_eq!(ic.link("gaia-osmo").unwrap().state(), LinkState::ChannelCreated);
    assert!(fx.gaia.is_started());
    assert!(fx.osmosis.is_started());

    let gaia = ic.chain("gaia").unwrap();
    let osmosis = ic.chain("osmosis").unwrap();
    let settings = ic.poll_settings();
    let rng = TestRng::with_seed(1);
    let users = fund_test_users(
        &[gaia.as_ref(), osmosis.as_ref()],
        &rng,
        "user",
        10_000_000,
        &settings,
    )
    .await
    .unwrap();
    let (alice, bob) = (&users[0], &users[1]);
    assert_eq!(gaia.get_balance(&alice.address, "uatom").await.unwrap(), 10_000_000);

    let channel = ic.link("gaia-osmo").unwrap().record().channel.unwrap();
    ic.start_relaying("gaia-osmo", false).await.unwrap();

    let tx = gaia
        .send_ibc_transfer(
            &channel.on_a.channel_id,
            &alice.key_name,
            &WalletAmount::new(bob.address.clone(), "uatom", 1_000),
            &TransferOptions::default(),
        )
        .await
        .unwrap();
    assert!(tx.packet.is_some());

    let voucher = transferred_denom("transfer", &channel.on_b.channel_id, "uatom");
    let received = poll_for_balance(
        osmosis.as_ref(),
        &WalletAmount::new(bob.address.clone(), voucher.clone(), 1_000),
        20,
        &settings,
    )
    .await
    .unwrap();
    assert_eq!(received, 1_000);
    assert_eq!(gaia.get_balance(&alice.address, "uatom").await.unwrap(), 9_999_000);

    // Send the voucher home: it unwinds to the native denom
    osmosis
        .send_ibc_transfer(
            &channel.on_b.channel_id,
            &bob.key_name,
            &WalletAmount::new(alice.address.clone(), voucher.clone(), 400),
            &TransferOptions::default(),
        )
        .await
        .unwrap();
    poll_for_balance(
        gaia.as_ref(),
        &WalletAmount::new(alice.address.clone(), "uatom", 9_999_400),
        20,
        &settings,
    )
    .await
    .unwrap();
    assert_eq!(osmosis.get_balance(&bob.address, &voucher).await.unwrap(), 600);

    ic.close().await.unwrap();
    assert_eq!(ic.phase(), Phase::Closed);
    assert_no_resources(&fx.hub);
}

#[tokio::test(start_paused = true)]
async fn test_relayer_wallets_are_funded_and_restored() {
    let (mut ic, fx) = two_chains();
    ic.build(BuildOptions::new("relayer_wallets")).await.unwrap();

    for (chain, handle, denom) in [("gaia", &fx.gaia, "uatom"), ("osmosis", &fx.osmosis, "uosmo")] {
        let wallet = ic.relayer_wallet("rly", chain).unwrap().clone();
        assert_eq!(handle.wallet(&wallet.key_name), Some(wallet.clone()));
        assert_eq!(
            handle.get_balance(&wallet.address, denom).await.unwrap(),
            ic.config().relayer_wallet_amount
        );
        assert!(fx.relayer.has_key(&handle.config().chain_id));
    }
    assert!(ic.relayer_wallet("rly", "juno").is_none());

    ic.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_same_seed_same_relayer_addresses() {
    let mut addresses = Vec::new();
    for _ in 0..2 {
        let (mut ic, _fx) = two_chains();
        ic.build(BuildOptions::new("seeded")).await.unwrap();
        addresses.push(ic.relayer_wallet("rly", "gaia").unwrap().address.clone());
        ic.close().await.unwrap();
    }
    assert_eq!(addresses[0], addresses[1]);
}

#[tokio::test(start_paused = true)]
async fn test_genesis_wallets() {
    let hub = LocalHub::new();
    let gaia = hub.chain(common::gaia());
    let mut ic = Interchain::new(hub.runtime());
    ic.add_chain_with_genesis(
        gaia.clone(),
        vec![WalletAmount::new("cosmos1genesisuser", "uatom", 77)],
    )
    .unwrap();

    ic.build(BuildOptions::new("genesis")).await.unwrap();
    assert_eq!(gaia.get_balance("cosmos1genesisuser", "uatom").await.unwrap(), 77);
    ic.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failed_chain_start_leaves_nothing_behind() {
    init_logger();
    let (mut ic, fx) = two_chains();
    fx.gaia.fail_start("invalid genesis file");

    let err = ic.build(BuildOptions::new("failed_start")).await.unwrap_err();
    match err.primary() {
        InterchainError::InitializationFailure { component, source } => {
            assert_eq!(component, "chain:gaia");
            assert!(source.to_string().contains("invalid genesis file"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(ic.phase(), Phase::Failed);
    assert!(matches!(ic.chain("osmosis"), Err(InterchainError::ChainNotStarted(_))));
    assert_no_resources(&fx.hub);

    // Build failure already tore everything down
    ic.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_teardown_problems_after_failed_build_keep_the_cause() {
    let (mut ic, fx) = two_chains();
    fx.gaia.fail_start("out of disk");
    fx.gaia.fail_teardown("container already gone");

    let err = ic.build(BuildOptions::new("aborted")).await.unwrap_err();
    assert!(matches!(err, InterchainError::BuildAborted { .. }));
    assert!(matches!(err.primary(), InterchainError::InitializationFailure { .. }));
    assert_eq!(err.teardown_issues().len(), 1);
    assert_eq!(err.teardown_issues()[0].component, "chain:gaia");

    // The label sweep still removed gaia's processes
    assert_no_resources(&fx.hub);
}

#[tokio::test(start_paused = true)]
async fn test_network_failure_starts_nothing() {
    let (mut ic, fx) = two_chains();
    fx.hub.runtime().fail_create_network(true);

    let err = ic.build(BuildOptions::new("no_network")).await.unwrap_err();
    assert!(matches!(err.primary(), InterchainError::InitializationFailure { component, .. } if component == "network"));
    assert_eq!(fx.hub.log().count("initialize"), 0);
    assert_eq!(fx.hub.log().count("teardown"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_halted_chain_never_becomes_ready() {
    let (ic, fx) = two_chains();
    let mut ic = ic.with_config(InterchainConfig {
        chain_ready_timeout_ms: 5_000,
        ..InterchainConfig::default()
    });
    fx.osmosis.set_halted(true);

    let err = ic.build(BuildOptions::new("halted")).await.unwrap_err();
    assert!(err.is_deadline_exceeded());
    assert!(!fx.relayer.has_key("gaia-1"));
    assert_no_resources(&fx.hub);
}

#[tokio::test(start_paused = true)]
async fn test_build_deadline() {
    let (mut ic, fx) = two_chains();
    fx.gaia.set_start_delay(Duration::from_secs(600));

    let err = ic
        .build(BuildOptions::new("deadline").with_deadline(Duration::from_secs(60)))
        .await
        .unwrap_err();
    match err.primary() {
        InterchainError::DeadlineExceeded { budget, .. } => {
            assert_eq!(*budget, Budget::WallClockMs(60_000))
        }
        other => panic!("unexpected error: {}", other),
    }
    // The in-flight start finished, but no relayer was configured afterwards
    assert_eq!(fx.hub.log().count("add_chain_configuration"), 0);
    assert_no_resources(&fx.hub);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_build() {
    let (mut ic, fx) = two_chains();
    let cancel = CancelSignal::new();
    cancel.cancel();

    let err = ic
        .build(BuildOptions::new("cancelled").with_cancel(cancel))
        .await
        .unwrap_err();
    assert!(matches!(err.primary(), InterchainError::Cancelled(_)));
    assert_eq!(fx.hub.log().count("initialize"), 0);
    assert_no_resources(&fx.hub);
}

#[tokio::test(start_paused = true)]
async fn test_failure_report_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let (mut ic, fx) = two_chains();
    fx.relayer.fail_on(HandshakeStep::CreateClients, "client state rejected");

    let err = ic
        .build(BuildOptions::new("reported").with_report_dir(dir.path()))
        .await
        .unwrap_err();
    assert!(matches!(err, InterchainError::LinksFailed(_)));

    let entry = std::fs::read_dir(dir.path()).unwrap().next().unwrap().unwrap();
    let report = BuildReport::load(entry.path()).await.unwrap();
    assert_eq!(report.metadata.test_name, "reported");
    assert_eq!(report.metadata.label, "interchain-test=reported");
    assert_eq!(report.metadata.rng_seed, Some(42));
    assert!(report
        .metadata
        .failure_reason
        .unwrap()
        .contains("client state rejected"));
    assert_eq!(report.chains.len(), 2);
    assert!(report.chains.iter().all(|c| c.state == "started"));
    assert_eq!(report.links[0].state, "unset");
    assert!(report
        .events
        .iter()
        .any(|e| e.component == "link:gaia-osmo" && e.action == "create-clients"));
    assert!(report.events.iter().any(|e| e.action == "sweep-label"));
}

#[tokio::test(start_paused = true)]
async fn test_declarations_close_once_build_starts() {
    let (mut ic, fx) = two_chains();
    ic.build(BuildOptions::new("frozen")).await.unwrap();

    let err = ic.add_chain(fx.hub.chain(juno())).err().unwrap();
    assert!(matches!(err, InterchainError::Declaration(DeclarationError::Frozen)));
    assert!(matches!(
        ic.build(BuildOptions::new("again")).await,
        Err(InterchainError::InvalidPhase { operation: "build", .. })
    ));
    ic.close().await.unwrap();
}
