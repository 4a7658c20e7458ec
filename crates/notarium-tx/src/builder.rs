//! Assemble a `WireTransaction` from typed parts.

use notarium_core::{Party, PrivacySalt, SecureHash, StateRef, TimeWindow};

use crate::component_group::ComponentGroup;
use crate::error::TxError;
use crate::states::{Command, OutputState};
use crate::wire::WireTransaction;

/// Collects transaction parts, then lays them out in canonical group order.
///
/// A fresh random salt is drawn at `build` unless one was set explicitly.
#[derive(Clone, Debug, Default)]
pub struct TransactionBuilder {
    inputs: Vec<StateRef>,
    outputs: Vec<OutputState>,
    commands: Vec<Command>,
    attachments: Vec<SecureHash>,
    notary: Option<Party>,
    time_window: Option<TimeWindow>,
    privacy_salt: Option<PrivacySalt>,
}

impl TransactionBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume `state`.
    pub fn add_input(mut self, state: StateRef) -> Self {
        self.inputs.push(state);
        self
    }

    /// Produce `state`.
    pub fn add_output(mut self, state: OutputState) -> Self {
        self.outputs.push(state);
        self
    }

    /// Attach a command.
    pub fn add_command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// Reference an attachment by id.
    pub fn add_attachment(mut self, id: SecureHash) -> Self {
        self.attachments.push(id);
        self
    }

    /// Name the notary.
    pub fn notary(mut self, notary: Party) -> Self {
        self.notary = Some(notary);
        self
    }

    /// Set the validity window.
    pub fn time_window(mut self, window: TimeWindow) -> Self {
        self.time_window = Some(window);
        self
    }

    /// Use a caller-supplied salt (tests and reproducible fixtures).
    pub fn privacy_salt(mut self, salt: PrivacySalt) -> Self {
        self.privacy_salt = Some(salt);
        self
    }

    /// Produce the transaction.
    ///
    /// Inputs and time windows both need a notary to be enforced, and an input
    /// may be listed only once.
    pub fn build(self) -> Result<WireTransaction, TxError> {
        if self.notary.is_none() && !self.inputs.is_empty() {
            return Err(TxError::InvalidArgument("transaction with inputs must name a notary"));
        }
        if self.notary.is_none() && self.time_window.is_some() {
            return Err(TxError::InvalidArgument("transaction with a time window must name a notary"));
        }
        let mut sorted = self.inputs.clone();
        sorted.sort();
        if sorted.windows(2).any(|w| w[0] == w[1]) {
            return Err(TxError::InvalidArgument("duplicate input state"));
        }
        if let Some(tw) = &self.time_window {
            tw.validate()?;
        }

        let groups = vec![
            ComponentGroup::from_items(&self.inputs)?,
            ComponentGroup::from_items(&self.outputs)?,
            ComponentGroup::from_items(&self.commands)?,
            ComponentGroup::from_items(&self.attachments)?,
            ComponentGroup::from_items(self.notary.as_slice())?,
            ComponentGroup::from_items(self.time_window.as_slice())?,
        ];
        let salt = self.privacy_salt.unwrap_or_else(PrivacySalt::random);
        WireTransaction::new(groups, salt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component_group::ComponentGroupKind;
    use notarium_core::{KeyPair, Timestamp};

    fn notary() -> Party {
        Party::new("O=Notary", KeyPair::generate().public_key())
    }

    fn input(i: u32) -> StateRef {
        StateRef::new(SecureHash([1u8; 32]), i)
    }

    #[test]
    fn builds_typed_groups_in_order() {
        let n = notary();
        let tw = TimeWindow::until_only(Timestamp(10_000));
        let tx = TransactionBuilder::new()
            .add_input(input(0))
            .add_input(input(1))
            .add_output(OutputState {
                contract: "cash".into(),
                data: vec![1],
            })
            .notary(n.clone())
            .time_window(tw)
            .build()
            .expect("tx");
        assert_eq!(tx.inputs().expect("inputs"), vec![input(0), input(1)]);
        assert_eq!(tx.outputs().expect("outputs").len(), 1);
        assert!(tx.commands().expect("commands").is_empty());
        assert!(tx.group(ComponentGroupKind::Attachments).is_empty());
        assert_eq!(tx.notary().expect("notary"), Some(n));
        assert_eq!(tx.time_window().expect("tw"), Some(tw));
    }

    #[test]
    fn fresh_salt_per_build() {
        let b = TransactionBuilder::new().add_output(OutputState {
            contract: "cash".into(),
            data: vec![],
        });
        let a = b.clone().build().expect("tx");
        let c = b.build().expect("tx");
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn fixed_salt_is_reproducible() {
        let salt = PrivacySalt::from_bytes([6u8; 32]).expect("salt");
        let n = notary();
        let build = || {
            TransactionBuilder::new()
                .add_input(input(3))
                .notary(n.clone())
                .privacy_salt(salt)
                .build()
                .expect("tx")
        };
        assert_eq!(build().id(), build().id());
    }

    #[test]
    fn inputs_require_notary() {
        let err = TransactionBuilder::new().add_input(input(0)).build();
        assert!(matches!(err, Err(TxError::InvalidArgument(_))));
    }

    #[test]
    fn time_window_requires_notary() {
        let err = TransactionBuilder::new()
            .time_window(TimeWindow::from_only(Timestamp(0)))
            .build();
        assert!(matches!(err, Err(TxError::InvalidArgument(_))));
    }

    #[test]
    fn duplicate_inputs_rejected() {
        let err = TransactionBuilder::new()
            .add_input(input(0))
            .add_input(input(0))
            .notary(notary())
            .build();
        assert!(matches!(err, Err(TxError::InvalidArgument(_))));
    }
}
