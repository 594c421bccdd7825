//! Format-independent entry point of the semantic normalizers.
//!
//! Every format syntax tree implements [`IntoNetwork`]; [`normalize`] turns any
//! of them into a fresh [`Network`]. Unresolvable names are reported as
//! [`ReferenceError`]s and normalization carries on with the rest.

use crate::core::lexer::Position;
use crate::types::diagnostics::Diagnostics;
use crate::types::errors::{ReferenceError, ReferenceKind};
use crate::types::network::{MessageKey, Network, NodeKey, SignalKey};

/// Capability of a syntax tree to be lowered into the shared network model.
pub trait IntoNetwork {
    fn to_network(&self, diagnostics: &mut Diagnostics) -> Network;
}

/// Builds the network described by `ast`.
pub fn normalize<A>(ast: &A, diagnostics: &mut Diagnostics) -> Network
where
    A: IntoNetwork + ?Sized,
{
    let network = ast.to_network(diagnostics);
    log::debug!(
        "normalized network '{}': {} nodes, {} messages, {} signals",
        network.name,
        network.nodes.len(),
        network.messages.len(),
        network.signals.len()
    );
    network
}

/// Name resolution against a network under construction, reporting misses.
pub(crate) struct Resolver<'a> {
    pub network: &'a Network,
    pub diagnostics: &'a mut Diagnostics,
}

impl<'a> Resolver<'a> {
    pub fn new(network: &'a Network, diagnostics: &'a mut Diagnostics) -> Self {
        Resolver {
            network,
            diagnostics,
        }
    }

    fn miss(&mut self, kind: ReferenceKind, name: &str, context: &str, pos: Option<Position>) {
        let mut err = ReferenceError::new(kind, name, context);
        err.position = pos;
        log::warn!("{}", err);
        self.diagnostics.push(err);
    }

    pub fn node(&mut self, name: &str, context: &str, pos: Option<Position>) -> Option<NodeKey> {
        let key = self.network.get_node_key_by_name(name);
        if key.is_none() {
            self.miss(ReferenceKind::Node, name, context, pos);
        }
        key
    }

    pub fn message(&mut self, name: &str, context: &str, pos: Option<Position>) -> Option<MessageKey> {
        let key = self.network.get_msg_key_by_name(name);
        if key.is_none() {
            self.miss(ReferenceKind::Message, name, context, pos);
        }
        key
    }

    /// Signal of a given message.
    pub fn signal(
        &mut self,
        mk: MessageKey,
        name: &str,
        context: &str,
        pos: Option<Position>,
    ) -> Option<SignalKey> {
        let key = self.network.get_sig_key_by_name(mk, name);
        if key.is_none() {
            self.miss(ReferenceKind::Signal, name, context, pos);
        }
        key
    }

    /// Signal looked up across the whole network (LIN signal names are global).
    pub fn global_signal(&mut self, name: &str, context: &str, pos: Option<Position>) -> Option<SignalKey> {
        let key = self.network.find_signal_key(name);
        if key.is_none() {
            self.miss(ReferenceKind::Signal, name, context, pos);
        }
        key
    }

    pub fn report(&mut self, kind: ReferenceKind, name: &str, context: &str, pos: Option<Position>) {
        self.miss(kind, name, context, pos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::network::BusType;

    struct Fixed;

    impl IntoNetwork for Fixed {
        fn to_network(&self, diagnostics: &mut Diagnostics) -> Network {
            let mut network = Network::new("fixed", BusType::Lin);
            network.add_node_if_absent("Master");
            let mut resolver = Resolver::new(&network, diagnostics);
            assert!(resolver.node("Master", "test", None).is_some());
            assert!(resolver.node("Ghost", "frame 'F'", Some(Position::new(4, 2))).is_none());
            network
        }
    }

    #[test]
    fn test_normalize_dispatches_and_reports() {
        let mut diagnostics = Diagnostics::new();
        let network = normalize(&Fixed, &mut diagnostics);
        assert_eq!(network.name, "fixed");
        let errors: Vec<&ReferenceError> = diagnostics.reference_errors().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ReferenceKind::Node);
        assert_eq!(errors[0].name, "Ghost");
        assert_eq!(errors[0].position, Some(Position::new(4, 2)));
        assert_eq!(
            errors[0].to_string(),
            "unresolved node 'Ghost' referenced by frame 'F'"
        );
    }
}
