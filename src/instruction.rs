//! Instruction assembly
//!
//! An [`InstructionDescriptor`] is the selector of the named operation
//! followed by the encoded arguments, plus the positional account list.
//! Building is pure: no account is checked for existence and nothing touches
//! the network.

use crate::codec::{decode_fields, CodecError, FieldKind, FieldValue, WireFormat};
use crate::selector::{Selector, GLOBAL_NAMESPACE, SELECTOR_LEN};
use dashmap::DashMap;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    ReadOnly,
    Writable,
}

/// One entry of an instruction's account list
///
/// The program resolves accounts by index, so a list of these is only
/// meaningful in the exact order the program declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountRef {
    pub address: Pubkey,
    pub access: Access,
    pub is_signer: bool,
}

impl AccountRef {
    pub fn writable(address: Pubkey) -> Self {
        Self {
            address,
            access: Access::Writable,
            is_signer: false,
        }
    }

    pub fn readonly(address: Pubkey) -> Self {
        Self {
            address,
            access: Access::ReadOnly,
            is_signer: false,
        }
    }

    pub fn writable_signer(address: Pubkey) -> Self {
        Self {
            address,
            access: Access::Writable,
            is_signer: true,
        }
    }

    pub fn readonly_signer(address: Pubkey) -> Self {
        Self {
            address,
            access: Access::ReadOnly,
            is_signer: true,
        }
    }

    pub fn is_writable(&self) -> bool {
        self.access == Access::Writable
    }
}

impl From<AccountRef> for AccountMeta {
    fn from(account: AccountRef) -> Self {
        if account.is_writable() {
            AccountMeta::new(account.address, account.is_signer)
        } else {
            AccountMeta::new_readonly(account.address, account.is_signer)
        }
    }
}

/// A fully assembled call: target program, positional accounts, payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionDescriptor {
    operation: String,
    program_id: Pubkey,
    accounts: Vec<AccountRef>,
    payload: Vec<u8>,
}

impl InstructionDescriptor {
    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    pub fn accounts(&self) -> &[AccountRef] {
        &self.accounts
    }

    /// Selector followed by the encoded arguments
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn selector(&self) -> Selector {
        let mut bytes = [0u8; SELECTOR_LEN];
        bytes.copy_from_slice(&self.payload[..SELECTOR_LEN]);
        Selector::from_bytes(bytes)
    }

    /// The argument bytes after the selector
    pub fn args(&self) -> &[u8] {
        &self.payload[SELECTOR_LEN..]
    }

    /// Read the arguments back against a schema
    pub fn decode_args(&self, schema: &[FieldKind]) -> Result<Vec<FieldValue>, CodecError> {
        decode_fields(schema, self.args())
    }

    pub fn required_signers(&self) -> impl Iterator<Item = &Pubkey> {
        self.accounts
            .iter()
            .filter(|a| a.is_signer)
            .map(|a| &a.address)
    }

    /// Consume the descriptor into the network's instruction type
    pub fn into_instruction(self) -> Instruction {
        Instruction {
            program_id: self.program_id,
            accounts: self.accounts.into_iter().map(AccountMeta::from).collect(),
            data: self.payload,
        }
    }
}

/// Builds descriptors for one target program
///
/// Selectors are memoized per operation name for the builder's lifetime.
#[derive(Debug)]
pub struct InstructionBuilder {
    program_id: Pubkey,
    namespace: String,
    selectors: DashMap<String, Selector>,
}

impl InstructionBuilder {
    pub fn new(program_id: Pubkey) -> Self {
        Self::with_namespace(program_id, GLOBAL_NAMESPACE)
    }

    pub fn with_namespace(program_id: Pubkey, namespace: impl Into<String>) -> Self {
        Self {
            program_id,
            namespace: namespace.into(),
            selectors: DashMap::new(),
        }
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    pub fn selector(&self, operation: &str) -> Selector {
        if let Some(hit) = self.selectors.get(operation) {
            return *hit;
        }
        let selector = Selector::namespaced(&self.namespace, operation);
        self.selectors.insert(operation.to_string(), selector);
        selector
    }

    /// Build from a per-call field list, encoded in the given order
    pub fn build(
        &self,
        operation: &str,
        accounts: Vec<AccountRef>,
        fields: &[FieldValue],
    ) -> Result<InstructionDescriptor, CodecError> {
        let mut payload = self.selector(operation).as_bytes().to_vec();
        for field in fields {
            field.encode(&mut payload)?;
        }
        Ok(self.descriptor(operation, accounts, payload))
    }

    /// Build from a typed argument struct
    pub fn build_typed<A: WireFormat>(
        &self,
        operation: &str,
        accounts: Vec<AccountRef>,
        args: &A,
    ) -> Result<InstructionDescriptor, CodecError> {
        let mut payload = self.selector(operation).as_bytes().to_vec();
        args.encode(&mut payload)?;
        Ok(self.descriptor(operation, accounts, payload))
    }

    fn descriptor(
        &self,
        operation: &str,
        accounts: Vec<AccountRef>,
        payload: Vec<u8>,
    ) -> InstructionDescriptor {
        InstructionDescriptor {
            operation: operation.to_string(),
            program_id: self.program_id,
            accounts,
            payload,
        }
    }
}
