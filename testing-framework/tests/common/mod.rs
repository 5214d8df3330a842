// Shared fixtures for the integration tests
#![allow(dead_code)]

use interchain_testing_framework::prelude::*;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn gaia() -> ChainConfig {
    ChainConfig::new(ChainFamily::Cosmos, "gaia", "gaia-1", "uatom").with_bech32_prefix("cosmos")
}

pub fn osmosis() -> ChainConfig {
    ChainConfig::new(ChainFamily::Cosmos, "osmosis", "osmosis-1", "uosmo").with_bech32_prefix("osmo")
}

pub fn juno() -> ChainConfig {
    ChainConfig::new(ChainFamily::Cosmos, "juno", "juno-1", "ujuno").with_bech32_prefix("juno")
}

/// Handles kept by a test to inspect and steer the local collaborators
pub struct Fixture {
    pub hub: LocalHub,
    pub gaia: Arc<LocalChain>,
    pub osmosis: Arc<LocalChain>,
    pub relayer: Arc<LocalRelayer>,
}

/// gaia <-> osmosis over one relayer, path `gaia-osmo`
pub fn two_chains() -> (Interchain, Fixture) {
    let hub = LocalHub::new();
    let gaia = hub.chain(gaia());
    let osmosis = hub.chain(osmosis());
    let relayer = hub.relayer();

    let mut ic = Interchain::new(hub.runtime()).with_rng(TestRng::with_seed(42));
    ic.add_chain(gaia.clone())
        .unwrap()
        .add_chain(osmosis.clone())
        .unwrap()
        .add_relayer(relayer.clone(), "rly")
        .unwrap()
        .add_link("gaia", "osmosis", "rly", "gaia-osmo")
        .unwrap();

    (
        ic,
        Fixture {
            hub,
            gaia,
            osmosis,
            relayer,
        },
    )
}

/// Nothing labeled `test_name` is left in the runtime
pub fn assert_no_resources(hub: &LocalHub) {
    let runtime = hub.runtime();
    assert!(runtime.group_names().is_empty(), "left over: {:?}", runtime.group_names());
    assert_eq!(runtime.network_count(), 0);
}
