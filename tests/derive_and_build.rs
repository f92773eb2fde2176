//! Address derivation and instruction assembly against the solana-sdk reference

use program_ops::codec::FieldValue;
use program_ops::derive::{create_derived_address, find_derived_address, MAX_SEED_LEN};
use program_ops::{AccountRef, AddressDeriver, DeriveError, InstructionBuilder, Selector};
use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;

#[test]
fn test_derivation_matches_sdk() {
    let program = Pubkey::new_unique();
    let owner = Pubkey::new_unique();

    for seeds in [
        vec![b"vault".as_slice()],
        vec![b"position".as_slice(), owner.as_ref()],
        vec![],
        vec![&[0u8; MAX_SEED_LEN][..], b"x".as_slice()],
    ] {
        let ours = find_derived_address(&seeds, &program).unwrap();
        let (expected, bump) = Pubkey::find_program_address(&seeds, &program);
        assert_eq!(ours.address, expected);
        assert_eq!(ours.bump, bump);
        assert!(!ours.address.is_on_curve());
    }
}

#[test]
fn test_explicit_bump_matches_sdk() {
    let program = Pubkey::new_unique();
    let derived = find_derived_address(&[b"config"], &program).unwrap();

    let recomputed = create_derived_address(&[b"config"], derived.bump, &program).unwrap();
    let sdk = Pubkey::create_program_address(&[b"config", &derived.bump_seed()], &program).unwrap();
    assert_eq!(recomputed, derived.address);
    assert_eq!(sdk, derived.address);
}

#[test]
fn test_seed_limits() {
    let program = Pubkey::new_unique();
    let long = [7u8; MAX_SEED_LEN + 1];

    let err = find_derived_address(&[b"ok", &long], &program).unwrap_err();
    assert_eq!(
        err,
        DeriveError::MaxSeedLengthExceeded {
            index: 1,
            len: MAX_SEED_LEN + 1
        }
    );

    let many: Vec<&[u8]> = (0..16).map(|_| b"s".as_slice()).collect();
    assert!(matches!(
        find_derived_address(&many, &program),
        Err(DeriveError::TooManySeeds { count: 16 })
    ));
}

#[test]
fn test_deriver_is_deterministic_and_cached() {
    let program = Pubkey::new_unique();
    let deriver = AddressDeriver::new();

    let first = deriver.derive(&[b"market", b"sol"], &program).unwrap();
    let second = deriver.derive(&[b"market", b"sol"], &program).unwrap();
    assert_eq!(first, second);
    assert_eq!(deriver.cache_len(), 1);

    // seed boundaries are part of the key
    let joined = deriver.derive(&[b"marketsol"], &program).unwrap();
    assert_eq!(deriver.cache_len(), 2);
    assert_eq!(first.seeds, vec![b"market".to_vec(), b"sol".to_vec()]);
    assert_eq!(joined.seeds, vec![b"marketsol".to_vec()]);

    let other_program = deriver.derive(&[b"market", b"sol"], &Pubkey::new_unique()).unwrap();
    assert_ne!(other_program.address, first.address);
}

#[test]
fn test_selector_is_sha256_prefix() {
    let digest = Sha256::digest(b"global:initialize");
    assert_eq!(Selector::of("initialize").as_bytes(), &digest[..8]);
    assert_ne!(Selector::of("initialize"), Selector::of("Initialize"));
    assert_eq!(
        Selector::namespaced("state", "initialize").as_bytes(),
        &Sha256::digest(b"state:initialize")[..8]
    );
}

#[test]
fn test_built_instruction_layout() {
    let program = Pubkey::new_unique();
    let builder = InstructionBuilder::new(program);
    let payer = Pubkey::new_unique();
    let vault = AddressDeriver::new().derive(&[b"vault"], &program).unwrap();

    let descriptor = builder
        .build(
            "deposit",
            vec![
                AccountRef::writable(vault.address),
                AccountRef::writable_signer(payer),
                AccountRef::readonly(solana_sdk::system_program::id()),
            ],
            &[FieldValue::U64(500), FieldValue::from("memo")],
        )
        .unwrap();

    let mut expected = Selector::of("deposit").as_bytes().to_vec();
    expected.extend_from_slice(&500u64.to_le_bytes());
    expected.extend_from_slice(&4u32.to_le_bytes());
    expected.extend_from_slice(b"memo");
    assert_eq!(descriptor.payload(), expected.as_slice());
    assert_eq!(descriptor.required_signers().collect::<Vec<_>>(), vec![&payer]);

    let ix = descriptor.into_instruction();
    assert_eq!(ix.program_id, program);
    assert_eq!(ix.data, expected);
    let keys: Vec<_> = ix.accounts.iter().map(|m| (m.pubkey, m.is_signer, m.is_writable)).collect();
    assert_eq!(
        keys,
        vec![
            (vault.address, false, true),
            (payer, true, true),
            (solana_sdk::system_program::id(), false, false),
        ]
    );
}
