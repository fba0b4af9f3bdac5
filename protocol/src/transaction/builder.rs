//! Transaction construction via the builder pattern.
//!
//! The [`TransactionBuilder`] assembles the fields, and `.build()` returns an
//! unsigned [`Transaction`]. Signing goes through a [`Signer`] so the builder
//! never touches key material itself.

use crate::crypto::signatures::Signer;
use crate::primitives::{Address, Amount};

use super::types::{Transaction, TxType};

/// Fluent builder for [`Transaction`].
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    tx_type: TxType,
    sender: Address,
    to: Option<Address>,
    value: Amount,
    nonce: u64,
    data: Vec<u8>,
}

impl TransactionBuilder {
    /// Start a transaction of the given type. All other fields default to zero.
    pub fn new(tx_type: TxType) -> Self {
        Self {
            tx_type,
            sender: Address::zero(),
            to: None,
            value: 0,
            nonce: 0,
            data: Vec::new(),
        }
    }

    /// Shorthand for a regular transfer.
    pub fn transfer(sender: Address, to: Address, value: Amount) -> Self {
        Self::new(TxType::Regular).sender(sender).to(to).value(value)
    }

    pub fn sender(mut self, sender: Address) -> Self {
        self.sender = sender;
        self
    }

    pub fn to(mut self, to: Address) -> Self {
        self.to = Some(to);
        self
    }

    pub fn value(mut self, value: Amount) -> Self {
        self.value = value;
        self
    }

    pub fn nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }

    /// Finish without a signature.
    pub fn build(self) -> Transaction {
        Transaction {
            nonce: self.nonce,
            sender: self.sender,
            to: self.to,
            value: self.value,
            data: self.data,
            tx_type: self.tx_type,
            signature: Vec::new(),
        }
    }

    /// Finish and sign with the sender's key.
    ///
    /// Returns `None` if the signer holds no key for the sender.
    pub fn build_signed(self, signer: &dyn Signer) -> Option<Transaction> {
        let mut tx = self.build();
        sign_transaction(&mut tx, signer)?;
        Some(tx)
    }
}

/// Attach the sender's signature over the transaction hash.
///
/// Returns `None` (leaving the transaction untouched) when the signer has no
/// key for `tx.sender`.
pub fn sign_transaction(tx: &mut Transaction, signer: &dyn Signer) -> Option<()> {
    let hash = tx.hash();
    let signature = signer.sign(&tx.sender, hash.as_bytes())?;
    tx.signature = signature;
    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::SelsiKeypair;
    use crate::crypto::signatures::{Keyring, SignatureVerifier};

    #[test]
    fn builder_sets_fields() {
        let tx = TransactionBuilder::transfer(Address::tagged(1), Address::tagged(2), 500)
            .nonce(3)
            .data(b"memo".to_vec())
            .build();

        assert_eq!(tx.sender, Address::tagged(1));
        assert_eq!(tx.to, Some(Address::tagged(2)));
        assert_eq!(tx.value, 500);
        assert_eq!(tx.nonce, 3);
        assert_eq!(tx.data, b"memo");
        assert_eq!(tx.tx_type, TxType::Regular);
        assert!(!tx.is_signed());
    }

    #[test]
    fn signed_transaction_verifies_for_sender() {
        let mut keyring = Keyring::new();
        let sender = Address::tagged(1);
        keyring.insert(sender, SelsiKeypair::from_seed(&[1u8; 32]));

        let tx = TransactionBuilder::transfer(sender, Address::tagged(2), 10)
            .build_signed(&keyring)
            .expect("keyring holds the sender key");

        assert!(keyring.verify_signature(&sender, tx.hash().as_bytes(), &tx.signature));
    }

    #[test]
    fn signing_without_key_fails() {
        let keyring = Keyring::new();
        let result = TransactionBuilder::transfer(Address::tagged(9), Address::tagged(2), 10)
            .build_signed(&keyring);
        assert!(result.is_none());
    }
}
