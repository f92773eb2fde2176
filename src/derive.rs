//! Program-derived address search
//!
//! A derived address is `sha256(seeds.. || bump || program_id || "ProgramDerivedAddress")`
//! for the highest `bump` whose digest is *not* a valid ed25519 point, so no
//! private key can exist for it. Results are pure functions of
//! `(seeds, program)`; `AddressDeriver` memoizes them for the lifetime of
//! one run because the same accounts are needed by many call sites.

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;
use tracing::debug;

/// Maximum length of a single seed
pub const MAX_SEED_LEN: usize = 32;

/// Maximum number of seeds, including the bump
pub const MAX_SEEDS: usize = 16;

const PDA_MARKER: &[u8; 21] = b"ProgramDerivedAddress";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeriveError {
    #[error("seed {index} is {len} bytes, max is {MAX_SEED_LEN}")]
    MaxSeedLengthExceeded { index: usize, len: usize },

    #[error("{count} seeds supplied, at most {} allowed alongside the bump", MAX_SEEDS - 1)]
    TooManySeeds { count: usize },

    /// The candidate digest is a curve point; try another bump
    #[error("bump {bump} produces an on-curve address")]
    OnCurve { bump: u8 },

    #[error("no valid derivation for program {program}: every bump produced an on-curve address")]
    NoValidDerivation { program: Pubkey },
}

/// A derived address together with everything needed to recompute it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivedAddress {
    pub seeds: Vec<Vec<u8>>,
    pub owning_program: Pubkey,
    pub bump: u8,
    pub address: Pubkey,
}

impl DerivedAddress {
    /// The bump as a seed slice, for callers that sign with these seeds
    pub fn bump_seed(&self) -> [u8; 1] {
        [self.bump]
    }
}

fn validate_seeds(seeds: &[&[u8]]) -> Result<(), DeriveError> {
    if seeds.len() >= MAX_SEEDS {
        return Err(DeriveError::TooManySeeds { count: seeds.len() });
    }
    if let Some((index, seed)) = seeds.iter().enumerate().find(|(_, s)| s.len() > MAX_SEED_LEN) {
        return Err(DeriveError::MaxSeedLengthExceeded {
            index,
            len: seed.len(),
        });
    }
    Ok(())
}

/// Compute the address for one explicit bump
pub fn create_derived_address(
    seeds: &[&[u8]],
    bump: u8,
    program: &Pubkey,
) -> Result<Pubkey, DeriveError> {
    validate_seeds(seeds)?;
    off_curve_address(seeds, bump, program).ok_or(DeriveError::OnCurve { bump })
}

// Seeds must already be validated. `None` when the digest is a curve point.
fn off_curve_address(seeds: &[&[u8]], bump: u8, program: &Pubkey) -> Option<Pubkey> {
    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update([bump]);
    hasher.update(program.as_ref());
    hasher.update(PDA_MARKER);
    let digest: [u8; 32] = hasher.finalize().into();

    let address = Pubkey::new_from_array(digest);
    (!address.is_on_curve()).then_some(address)
}

/// Search the bump range from 255 downward for the canonical address
pub fn find_derived_address(
    seeds: &[&[u8]],
    program: &Pubkey,
) -> Result<DerivedAddress, DeriveError> {
    validate_seeds(seeds)?;

    (0..=u8::MAX)
        .rev()
        .find_map(|bump| {
            off_curve_address(seeds, bump, program).map(|address| DerivedAddress {
                seeds: seeds.iter().map(|s| s.to_vec()).collect(),
                owning_program: *program,
                bump,
                address,
            })
        })
        .ok_or(DeriveError::NoValidDerivation { program: *program })
}

type CacheKey = (Pubkey, Vec<Vec<u8>>);

/// Run-scoped memo of derived addresses
#[derive(Debug, Default)]
pub struct AddressDeriver {
    cache: DashMap<CacheKey, DerivedAddress>,
}

impl AddressDeriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn derive(
        &self,
        seeds: &[&[u8]],
        program: &Pubkey,
    ) -> Result<DerivedAddress, DeriveError> {
        let key: CacheKey = (*program, seeds.iter().map(|s| s.to_vec()).collect());
        if let Some(hit) = self.cache.get(&key) {
            debug!(program = %program, address = %hit.address, "Derived address cache hit");
            return Ok(hit.clone());
        }

        let derived = find_derived_address(seeds, program)?;
        debug!(
            program = %program,
            address = %derived.address,
            bump = derived.bump,
            "Derived address computed"
        );
        self.cache.insert(key, derived.clone());
        Ok(derived)
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}
