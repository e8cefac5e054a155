//! One-time radio link setup.

use radiotun_interfaces::{InterfaceError, MeshSettings, RadioSettings, RadioTransport};

use crate::config::BridgeConfig;

/// Radio settings derived from the bridge configuration.
///
/// Multicast relay is always on so broadcasts from the root reach nodes
/// below the first level.
pub fn radio_settings(config: &BridgeConfig) -> RadioSettings {
    RadioSettings {
        channel: config.channel,
        data_rate: config.data_rate,
        multicast_relay: true,
        mesh: config.mesh.then_some(MeshSettings {
            node_id: config.mesh_node_id,
        }),
    }
}

/// Bring the radio up as the configured node.
pub fn begin_radio<T: RadioTransport + ?Sized>(
    transport: &mut T,
    config: &BridgeConfig,
) -> Result<(), InterfaceError> {
    let settings = radio_settings(config);
    transport.begin(&settings, config.local_address)?;
    match settings.mesh {
        Some(mesh) => tracing::info!(
            "radio up: node {} (mesh id {}), channel {}, {}",
            config.local_address,
            mesh.node_id,
            settings.channel,
            settings.data_rate
        ),
        None => tracing::info!(
            "radio up: node {}, channel {}, {}",
            config.local_address,
            settings.channel,
            settings.data_rate
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use radiotun_core::{DataRate, MeshNodeId, NodeAddress};
    use radiotun_interfaces::testing::MockTransport;

    use super::*;

    #[test]
    fn settings_without_mesh() {
        let config = BridgeConfig {
            channel: 90,
            data_rate: DataRate::Mbps2,
            ..BridgeConfig::default()
        };
        let settings = radio_settings(&config);
        assert_eq!(settings.channel, 90);
        assert_eq!(settings.data_rate, DataRate::Mbps2);
        assert!(settings.multicast_relay);
        assert_eq!(settings.mesh, None);
    }

    #[test]
    fn begin_passes_mesh_id_and_address() {
        let local = NodeAddress::new(0o3).unwrap();
        let config = BridgeConfig {
            mesh: true,
            local_address: local,
            mesh_node_id: MeshNodeId(42),
            ..BridgeConfig::default()
        };
        let mut transport = MockTransport::new(NodeAddress::ROOT);
        begin_radio(&mut transport, &config).unwrap();

        assert_eq!(transport.local_address(), local);
        let settings = transport.settings().unwrap();
        assert_eq!(
            settings.mesh,
            Some(MeshSettings {
                node_id: MeshNodeId(42)
            })
        );
    }
}
