//! Script opcodes and push encoding
//!
//! Only the subset of Bitcoin script needed for P2SH multisig and standard
//! output templates.

/// Push an empty byte vector (also the CHECKMULTISIG dummy element)
pub const OP_0: u8 = 0x00;
/// Next byte is the push length
pub const OP_PUSHDATA1: u8 = 0x4c;
/// Next two bytes (little endian) are the push length
pub const OP_PUSHDATA2: u8 = 0x4d;
/// Small integer 1
pub const OP_1: u8 = 0x51;
/// Small integer 2
pub const OP_2: u8 = 0x52;
/// Small integer 3
pub const OP_3: u8 = 0x53;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKMULTISIG: u8 = 0xae;

/// Largest payload a direct push opcode can carry
const MAX_DIRECT_PUSH: usize = 75;

/// Encode a small integer 1..=16 as `OP_N`
pub fn small_int(n: u8) -> u8 {
    debug_assert!((1..=16).contains(&n));
    OP_1 + (n - 1)
}

/// Decode an `OP_N` opcode back to its integer value
pub fn decode_small_int(op: u8) -> Option<u8> {
    if (OP_1..=OP_1 + 15).contains(&op) {
        Some(op - OP_1 + 1)
    } else {
        None
    }
}

/// Append a minimal data push to `script`
pub fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    let len = data.len();
    if len <= MAX_DIRECT_PUSH {
        script.push(len as u8);
    } else if len <= u8::MAX as usize {
        script.push(OP_PUSHDATA1);
        script.push(len as u8);
    } else {
        script.push(OP_PUSHDATA2);
        script.extend_from_slice(&(len as u16).to_le_bytes());
    }
    script.extend_from_slice(data);
}

/// A parsed script element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Data push (`OP_0` parses as an empty push)
    Push(Vec<u8>),
    /// Any non-push opcode
    Op(u8),
}

/// Split a script into instructions
///
/// Returns `None` if a push runs past the end of the script.
pub fn parse_instructions(script: &[u8]) -> Option<Vec<Instruction>> {
    let mut out = Vec::new();
    let mut i = 0;

    while i < script.len() {
        let op = script[i];
        i += 1;

        let len = match op {
            OP_0 => {
                out.push(Instruction::Push(Vec::new()));
                continue;
            }
            1..=0x4b => op as usize,
            OP_PUSHDATA1 => {
                let len = *script.get(i)? as usize;
                i += 1;
                len
            }
            OP_PUSHDATA2 => {
                let bytes = script.get(i..i + 2)?;
                i += 2;
                u16::from_le_bytes([bytes[0], bytes[1]]) as usize
            }
            _ => {
                out.push(Instruction::Op(op));
                continue;
            }
        };

        let data = script.get(i..i + len)?;
        out.push(Instruction::Push(data.to_vec()));
        i += len;
    }

    Some(out)
}
