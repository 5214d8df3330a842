// Integration tests for link handshakes driven by build and by hand

mod common;

use common::*;
use interchain_testing_framework::prelude::*;

#[tokio::test(start_paused = true)]
async fn test_manual_handshake_steps() {
    init_logger();
    let (mut ic, fx) = two_chains();
    ic.build(BuildOptions::new("manual_steps").skip_path_creation())
        .await
        .unwrap();
    assert_eq!(ic.link("gaia-osmo").unwrap().state(), LinkState::Unset);
    assert_eq!(fx.hub.log().count("generate_path"), 0);

    let handshake = ic.handshake("gaia-osmo").unwrap();
    let err = handshake
        .create_clients(&ClientOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        InterchainError::StepOutOfOrder {
            step: HandshakeStep::CreateClients,
            state: LinkState::Unset,
            ..
        }
    ));
    assert!(matches!(
        handshake.create_connection().await,
        Err(InterchainError::StepOutOfOrder { step: HandshakeStep::CreateConnection, .. })
    ));

    handshake.generate_path().await.unwrap();
    let clients = handshake.create_clients(&ClientOptions::default()).await.unwrap();
    assert_eq!(clients.on_a.tracked_chain_id, "osmosis-1");
    assert_eq!(clients.on_b.tracked_chain_id, "gaia-1");

    // Already recorded: no second relayer call
    let again = handshake.create_clients(&ClientOptions::default()).await.unwrap();
    assert_eq!(again, clients);
    assert_eq!(fx.hub.log().count("create_clients"), 1);
    assert_eq!(ic.link("gaia-osmo").unwrap().state(), LinkState::ClientCreated);

    let connection = handshake.create_connection().await.unwrap();
    assert_eq!(connection.on_a.counterparty.connection_id, connection.on_b.connection_id);

    let channel = handshake
        .create_channel(&ChannelOptions {
            order: Order::Ordered,
            version: "ics27-1".to_string(),
            ..ChannelOptions::default()
        })
        .await
        .unwrap();
    assert_eq!(channel.on_a.ordering, Order::Ordered);
    assert_eq!(channel.on_b.version, "ics27-1");
    assert_eq!(channel.on_a.counterparty.channel_id, channel.on_b.channel_id);
    assert_eq!(channel.on_a.connection_hops, vec![connection.on_a.connection_id.clone()]);

    // Every step is recorded, establish has nothing left to do
    assert_eq!(handshake.establish().await.unwrap(), channel);
    assert_eq!(fx.hub.log().count("create_channel"), 1);
    assert_eq!(ic.link("gaia-osmo").unwrap().state(), LinkState::ChannelCreated);

    ic.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_relaying_requires_an_established_channel() {
    let (mut ic, _fx) = two_chains();
    ic.build(BuildOptions::new("not_ready").skip_path_creation())
        .await
        .unwrap();
    ic.handshake("gaia-osmo").unwrap().generate_path().await.unwrap();

    let err = ic.start_relaying("gaia-osmo", false).await.unwrap_err();
    assert!(matches!(
        err,
        InterchainError::LinkNotReady { ref path, state: LinkState::Unset } if path == "gaia-osmo"
    ));
    assert!(ic.relaying_paths().is_empty());

    ic.start_relaying("gaia-osmo", true).await.unwrap();
    assert_eq!(ic.relaying_paths(), vec!["gaia-osmo".to_string()]);

    let summary = ic.stop_relaying("gaia-osmo").await.unwrap();
    assert_eq!(summary.failures, 0);
    assert!(matches!(
        ic.stop_relaying("gaia-osmo").await,
        Err(InterchainError::InvalidPhase { .. })
    ));

    ic.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failed_link_does_not_stop_the_others() {
    init_logger();
    let hub = LocalHub::new();
    let r1 = hub.relayer();
    let r2 = hub.relayer();
    r1.fail_on(HandshakeStep::CreateConnection, "connection handshake timed out");

    let mut ic = Interchain::new(hub.runtime());
    ic.add_chain(hub.chain(gaia()))
        .unwrap()
        .add_chain(hub.chain(osmosis()))
        .unwrap()
        .add_chain(hub.chain(juno()))
        .unwrap()
        .add_relayer(r1.clone(), "r1")
        .unwrap()
        .add_relayer(r2.clone(), "r2")
        .unwrap()
        .add_link("gaia", "osmosis", "r1", "gaia-osmo")
        .unwrap()
        .add_link("osmosis", "juno", "r2", "osmo-juno")
        .unwrap();

    let err = ic.build(BuildOptions::new("three_chains")).await.unwrap_err();
    match &err {
        InterchainError::LinksFailed(failures) => {
            assert_eq!(failures.len(), 1);
            assert!(matches!(
                &failures[0],
                InterchainError::HandshakeRejection {
                    path,
                    relayer,
                    step: HandshakeStep::CreateConnection,
                    ..
                } if path == "gaia-osmo" && relayer == "r1"
            ));
        }
        other => panic!("unexpected error: {}", other),
    }

    assert_eq!(ic.link("gaia-osmo").unwrap().state(), LinkState::ClientCreated);
    assert_eq!(ic.link("osmo-juno").unwrap().state(), LinkState::ChannelCreated);
    let r1_connections = hub
        .log()
        .positions(|c| c.actor == "relayer:relayer-0" && c.action == "create_connections");
    assert_eq!(r1_connections.len(), 1);

    // Each relayer holds keys only for the chains it links
    assert!(r1.has_key("gaia-1") && r1.has_key("osmosis-1") && !r1.has_key("juno-1"));
    assert!(r2.has_key("juno-1") && !r2.has_key("gaia-1"));
    assert_no_resources(&hub);
}

#[tokio::test(start_paused = true)]
async fn test_slow_confirmation_exhausts_block_budget() {
    let (mut ic, fx) = two_chains();
    fx.relayer.set_visibility_delay(50);

    let err = ic.build(BuildOptions::new("slow_relayer")).await.unwrap_err();
    match &err {
        InterchainError::LinksFailed(failures) => match &failures[0] {
            InterchainError::DeadlineExceeded { budget, .. } => {
                assert_eq!(*budget, Budget::Blocks(ic.config().handshake_block_budget))
            }
            other => panic!("unexpected link failure: {}", other),
        },
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(ic.link("gaia-osmo").unwrap().state(), LinkState::Unset);
}

#[tokio::test(start_paused = true)]
async fn test_custom_link_options_are_used_by_build() {
    let hub = LocalHub::new();
    let mut ic = Interchain::new(hub.runtime());
    let mut spec = LinkSpec::new("gaia", "osmosis", "rly", "ica");
    spec.channel_options = ChannelOptions {
        source_port: "icacontroller-user".to_string(),
        dest_port: "icahost".to_string(),
        order: Order::Ordered,
        version: "ics27-1".to_string(),
    };
    ic.add_chain(hub.chain(gaia()))
        .unwrap()
        .add_chain(hub.chain(osmosis()))
        .unwrap()
        .add_relayer(hub.relayer(), "rly")
        .unwrap()
        .add_link_with(spec)
        .unwrap();

    ic.build(BuildOptions::new("custom_ports")).await.unwrap();
    let channel = ic.link("ica").unwrap().record().channel.unwrap();
    assert_eq!(channel.on_a.port_id, "icacontroller-user");
    assert_eq!(channel.on_b.port_id, "icahost");
    assert_eq!(channel.on_a.counterparty.port_id, "icahost");
    assert_eq!(channel.on_b.ordering, Order::Ordered);
    ic.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_parallel_paths_over_one_pair_keep_their_own_artifacts() {
    init_logger();
    let hub = LocalHub::new();
    let relayer = hub.relayer();
    // Artifacts lag behind so both links are mid-handshake at once
    relayer.set_visibility_delay(3);

    let mut ic = Interchain::new(hub.runtime());
    ic.add_chain(hub.chain(gaia()))
        .unwrap()
        .add_chain(hub.chain(osmosis()))
        .unwrap()
        .add_relayer(relayer.clone(), "rly")
        .unwrap()
        .add_link("gaia", "osmosis", "rly", "p1")
        .unwrap()
        .add_link("gaia", "osmosis", "rly", "p2")
        .unwrap();

    ic.build(BuildOptions::new("two_paths")).await.unwrap();

    let p1 = ic.link("p1").unwrap().record();
    let p2 = ic.link("p2").unwrap().record();
    for record in [&p1, &p2] {
        let clients = record.clients.as_ref().unwrap();
        let connection = record.connection.as_ref().unwrap();
        let channel = record.channel.as_ref().unwrap();
        assert_eq!(connection.on_a.client_id, clients.on_a.client_id);
        assert_eq!(connection.on_b.client_id, clients.on_b.client_id);
        assert_eq!(channel.on_a.connection_hops, vec![connection.on_a.connection_id.clone()]);
        assert_eq!(channel.on_b.connection_hops, vec![connection.on_b.connection_id.clone()]);
        assert_eq!(channel.on_a.counterparty.channel_id, channel.on_b.channel_id);
    }

    let (c1, c2) = (p1.clients.unwrap(), p2.clients.unwrap());
    assert_ne!(c1.on_a.client_id, c2.on_a.client_id);
    assert_ne!(c1.on_b.client_id, c2.on_b.client_id);
    let (ch1, ch2) = (p1.channel.unwrap(), p2.channel.unwrap());
    assert_ne!(ch1.on_a.channel_id, ch2.on_a.channel_id);
    assert_ne!(ch1.on_b.channel_id, ch2.on_b.channel_id);
    assert_eq!(ic.link("p2").unwrap().state(), LinkState::ChannelCreated);

    ic.close().await.unwrap();
    assert_no_resources(&hub);
}
