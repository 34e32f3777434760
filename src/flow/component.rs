//! # Component identity and classification.
//!
//! Every observed unit of mediation is a *component*: a named, typed piece of
//! the pipeline. [`ComponentKind`] decides whether a component is an entry
//! point (may itself enable statistics for a new flow) or a child (inherits
//! the enclosing decision). [`ComponentRole`] carries the behavioral flags the
//! completion logic needs, as an explicit closed enumeration instead of type
//! inspection at the call site.

/// Closed classification of mediation components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// REST API entry point.
    Api,
    /// Proxy service entry point.
    ProxyService,
    /// Inbound endpoint entry point.
    InboundEndpoint,
    /// Mediation sequence.
    Sequence,
    /// API resource.
    Resource,
    /// Outbound endpoint.
    Endpoint,
    /// Individual mediator.
    Mediator,
}

impl ComponentKind {
    /// True for components that may start a flow and decide its enablement.
    ///
    /// Child components (sequences, mediators, endpoints, resources) inherit
    /// the decision made by the enclosing entry component.
    #[inline]
    pub fn is_entry(&self) -> bool {
        matches!(
            self,
            ComponentKind::Api | ComponentKind::ProxyService | ComponentKind::InboundEndpoint
        )
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ComponentKind::Api => "api",
            ComponentKind::ProxyService => "proxy_service",
            ComponentKind::InboundEndpoint => "inbound_endpoint",
            ComponentKind::Sequence => "sequence",
            ComponentKind::Resource => "resource",
            ComponentKind::Endpoint => "endpoint",
            ComponentKind::Mediator => "mediator",
        }
    }
}

/// Behavioral role of a component, carried explicitly on its Open observation.
///
/// Replaces subtype inspection: the routing layer states the role when it
/// enters the component, and downstream completion logic only ever looks at
/// this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComponentRole {
    /// Plain synchronous component.
    #[default]
    Simple,
    /// Component whose mediation continues after an asynchronous hop.
    Continuable,
    /// Fan-out component (clone/iterate/scatter-gather): children are branches.
    Splitting,
    /// Fan-in component that joins branch results.
    Aggregating,
}

impl ComponentRole {
    /// True if this component produces branches.
    #[inline]
    pub fn is_splitting(&self) -> bool {
        matches!(self, ComponentRole::Splitting)
    }

    /// True if this component joins branches.
    #[inline]
    pub fn is_aggregating(&self) -> bool {
        matches!(self, ComponentRole::Aggregating)
    }

    /// True if mediation may continue after an asynchronous suspension.
    #[inline]
    pub fn is_continuable(&self) -> bool {
        matches!(self, ComponentRole::Continuable)
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ComponentRole::Simple => "simple",
            ComponentRole::Continuable => "continuable",
            ComponentRole::Splitting => "splitting",
            ComponentRole::Aggregating => "aggregating",
        }
    }
}
