// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Port translation applied when mirroring a virtual service onto the physical cluster.

use crate::constants::metrics;
use k8s_openapi::api::core::v1::ServicePort;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

/// Pure mapping from virtual service ports to physical service ports
pub type PortTranslator = fn(&[ServicePort]) -> Vec<ServicePort>;

/// Copy ports across, dropping node ports which are allocated per cluster.
pub fn translate_service_ports(ports: &[ServicePort]) -> Vec<ServicePort> {
    ports
        .iter()
        .map(|port| ServicePort {
            node_port: None,
            ..port.clone()
        })
        .collect()
}

/// Route every port to the control plane's metrics proxy listener.
pub fn translate_metrics_proxy_ports(ports: &[ServicePort]) -> Vec<ServicePort> {
    translate_service_ports(ports)
        .into_iter()
        .map(|port| ServicePort {
            target_port: Some(IntOrString::Int(metrics::PROXY_TARGET_PORT)),
            ..port
        })
        .collect()
}
