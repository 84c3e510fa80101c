//! Spend verification for P2SH multisig inputs
//!
//! Re-runs what a node does for `OP_0 <sig>.. <redeem>` against
//! `OP_HASH160 <h> OP_EQUAL`: the redeem script must hash to the committed
//! value, then `OP_CHECKMULTISIG` walks signatures and keys in order. A
//! signature can only match a key at or after the key matched by the
//! previous signature, which is why finalization has to order signatures by
//! key position.

use super::opcodes::{decode_small_int, parse_instructions, Instruction, OP_CHECKMULTISIG};
use super::threshold::{ScriptError, ThresholdScript};
use crate::crypto::{hash160, parse_public_key, verify_digest};

/// Sighash flag appended to every signature we produce
pub const SIGHASH_ALL: u8 = 0x01;

/// Check that `script_sig` satisfies `script` for an input whose digest is
/// `digest`
pub fn verify_multisig_spend(
    script: &ThresholdScript,
    script_sig: &[u8],
    digest: &[u8; 32],
) -> Result<(), ScriptError> {
    let items = parse_instructions(script_sig)
        .ok_or_else(|| ScriptError::MalformedScript("truncated push in scriptSig".into()))?;

    // scriptSig must be push-only
    let mut pushes = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Instruction::Push(data) => pushes.push(data),
            Instruction::Op(op) => {
                return Err(ScriptError::MalformedScript(format!(
                    "non-push opcode {:#04x} in scriptSig",
                    op
                )))
            }
        }
    }

    let redeem = pushes
        .pop()
        .ok_or_else(|| ScriptError::MalformedScript("empty scriptSig".into()))?;

    // P2SH commitment
    if script.script_pubkey()[2..22] != hash160(&redeem) {
        return Err(ScriptError::NotSatisfied(
            "redeem script does not match script hash".into(),
        ));
    }

    let (required, keys) = parse_multisig_redeem(&redeem)?;

    // CHECKMULTISIG consumes an extra element; it must be empty (NULLDUMMY)
    let (dummy, signatures) = pushes
        .split_first()
        .ok_or_else(|| ScriptError::NotSatisfied("missing dummy element".into()))?;
    if !dummy.is_empty() {
        return Err(ScriptError::NotSatisfied("dummy element must be empty".into()));
    }
    if signatures.len() != required {
        return Err(ScriptError::NotSatisfied(format!(
            "expected {} signatures, found {}",
            required,
            signatures.len()
        )));
    }

    let mut key_idx = 0;
    let mut sig_idx = 0;
    while sig_idx < required {
        if keys.len() - key_idx < required - sig_idx {
            return Err(ScriptError::NotSatisfied(format!(
                "signature {} has no matching key in remaining order",
                sig_idx
            )));
        }

        let sig = &signatures[sig_idx];
        let (hash_type, der) = sig
            .split_last()
            .ok_or_else(|| ScriptError::NotSatisfied("empty signature".into()))?;
        if *hash_type != SIGHASH_ALL {
            return Err(ScriptError::UnsupportedSighash(*hash_type));
        }

        let key = parse_public_key(&keys[key_idx]).map_err(|e| ScriptError::InvalidKeyEncoding {
            index: key_idx,
            reason: e.to_string(),
        })?;
        if verify_digest(&key, digest, der).unwrap_or(false) {
            sig_idx += 1;
        }
        key_idx += 1;
    }

    Ok(())
}

/// Parse `OP_m <key>.. OP_n OP_CHECKMULTISIG`
fn parse_multisig_redeem(redeem: &[u8]) -> Result<(usize, Vec<Vec<u8>>), ScriptError> {
    let items = parse_instructions(redeem)
        .ok_or_else(|| ScriptError::MalformedScript("truncated push in redeem script".into()))?;

    let malformed = || ScriptError::MalformedScript("not a multisig redeem script".into());

    let (first, rest) = items.split_first().ok_or_else(malformed)?;
    let required = match first {
        Instruction::Op(op) => decode_small_int(*op).ok_or_else(malformed)? as usize,
        _ => return Err(malformed()),
    };

    let mut keys = Vec::new();
    let mut tail = rest.iter();
    let total = loop {
        match tail.next() {
            Some(Instruction::Push(key)) => keys.push(key.clone()),
            Some(Instruction::Op(op)) => break decode_small_int(*op).ok_or_else(malformed)? as usize,
            None => return Err(malformed()),
        }
    };

    match (tail.next(), tail.next()) {
        (Some(Instruction::Op(OP_CHECKMULTISIG)), None) => {}
        _ => return Err(malformed()),
    }

    if total != keys.len() || required == 0 || required > total {
        return Err(malformed());
    }

    Ok((required, keys))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{double_sha256, KeyPair};
    use crate::script::opcodes::{push_data, OP_0};
    use crate::script::{derive, Network};

    fn setup() -> (ThresholdScript, Vec<KeyPair>) {
        let keys: Vec<KeyPair> = (0..3).map(|_| KeyPair::generate()).collect();
        let raw: Vec<Vec<u8>> = keys.iter().map(|k| k.public_key.serialize().to_vec()).collect();
        let script = derive(&raw, Network::Regtest).unwrap();

        // Return signers in script order
        let mut ordered = keys;
        ordered.sort_by_key(|k| script.keys().position(&k.public_key).unwrap());
        (script, ordered)
    }

    fn script_sig(script: &ThresholdScript, sigs: &[Vec<u8>]) -> Vec<u8> {
        let mut out = vec![OP_0];
        for sig in sigs {
            let mut with_type = sig.clone();
            with_type.push(SIGHASH_ALL);
            push_data(&mut out, &with_type);
        }
        push_data(&mut out, script.redeem_script());
        out
    }

    #[test]
    fn test_ordered_signatures_satisfy() {
        let (script, signers) = setup();
        let digest = double_sha256(b"spend");

        for (a, b) in [(0, 1), (0, 2), (1, 2)] {
            let sigs = vec![signers[a].sign(&digest).unwrap(), signers[b].sign(&digest).unwrap()];
            verify_multisig_spend(&script, &script_sig(&script, &sigs), &digest).unwrap();
        }
    }

    #[test]
    fn test_reversed_signatures_fail() {
        let (script, signers) = setup();
        let digest = double_sha256(b"spend");

        let sigs = vec![signers[2].sign(&digest).unwrap(), signers[0].sign(&digest).unwrap()];
        assert!(matches!(
            verify_multisig_spend(&script, &script_sig(&script, &sigs), &digest),
            Err(ScriptError::NotSatisfied(_))
        ));
    }

    #[test]
    fn test_single_signature_fails() {
        let (script, signers) = setup();
        let digest = double_sha256(b"spend");

        let sigs = vec![signers[0].sign(&digest).unwrap()];
        assert!(verify_multisig_spend(&script, &script_sig(&script, &sigs), &digest).is_err());
    }

    #[test]
    fn test_wrong_digest_fails() {
        let (script, signers) = setup();
        let digest = double_sha256(b"spend");
        let other = double_sha256(b"other");

        let sigs = vec![signers[0].sign(&other).unwrap(), signers[1].sign(&other).unwrap()];
        assert!(verify_multisig_spend(&script, &script_sig(&script, &sigs), &digest).is_err());
    }
}
