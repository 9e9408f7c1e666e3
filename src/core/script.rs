// Script forms the wallet understands
//
// Only four output shapes are recognized (P2PKH, P2PK, P2SH, and the
// standard scriptsig spending the first two); everything else is reported
// as unsupported and skipped by the ledger.

use thiserror::Error;

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_1: u8 = 0x51;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKMULTISIG: u8 = 0xae;

/// SIGHASH_ALL, the only hash type the wallet emits or accepts
pub const SIGHASH_ALL: u8 = 0x01;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("script form is not supported")]
    Unsupported,
    #[error("scriptsig is malformed")]
    MalformedScriptSig,
}

/// The output shapes the ledger can own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CoinKind {
    P2pkh = 0,
    P2pk = 1,
}

/// A recognized output script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptForm {
    /// OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG
    P2pkh([u8; 20]),
    /// <len> <pubkey> OP_CHECKSIG
    P2pk(Vec<u8>),
    /// OP_HASH160 <20> OP_EQUAL
    P2sh([u8; 20]),
}

/// Classify an output script into one of the understood forms
pub fn classify(script: &[u8]) -> Result<ScriptForm, ScriptError> {
    // P2PKH: 25 bytes, fixed opcodes around a 20-byte push
    if script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 20
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
    {
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&script[3..23]);
        return Ok(ScriptForm::P2pkh(hash));
    }

    // P2SH: 23 bytes, OP_HASH160 <20> OP_EQUAL
    if script.len() == 23 && script[0] == OP_HASH160 && script[1] == 20 && script[22] == OP_EQUAL {
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&script[2..22]);
        return Ok(ScriptForm::P2sh(hash));
    }

    // P2PK: <len> <pubkey> OP_CHECKSIG with a plausible SEC key length
    if script.len() >= 3 {
        let key_len = script[0] as usize;
        if (key_len == 33 || key_len == 65)
            && script.len() == key_len + 2
            && script[script.len() - 1] == OP_CHECKSIG
        {
            return Ok(ScriptForm::P2pk(script[1..1 + key_len].to_vec()));
        }
    }

    Err(ScriptError::Unsupported)
}

/// Build a P2PKH output script
pub fn p2pkh_output(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    script.push(20);
    script.extend_from_slice(pubkey_hash);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

/// Build a P2PK output script
pub fn p2pk_output(pubkey_sec: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(pubkey_sec.len() + 2);
    script.push(pubkey_sec.len() as u8);
    script.extend_from_slice(pubkey_sec);
    script.push(OP_CHECKSIG);
    script
}

/// Build a P2SH output script from the redeem script's HASH-160
pub fn p2sh_output(script_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(23);
    script.push(OP_HASH160);
    script.push(20);
    script.extend_from_slice(script_hash);
    script.push(OP_EQUAL);
    script
}

/// Build an M-of-N multisig redeem script:
/// OP_M <pubkey>... OP_N OP_CHECKMULTISIG
pub fn multisig_redeem(m: u8, pubkeys: &[Vec<u8>]) -> Vec<u8> {
    debug_assert!(m >= 1 && (m as usize) <= pubkeys.len() && pubkeys.len() <= 16);
    let mut script = Vec::new();
    script.push(OP_1 + (m - 1));
    for pk in pubkeys {
        script.push(pk.len() as u8);
        script.extend_from_slice(pk);
    }
    script.push(OP_1 + (pubkeys.len() as u8 - 1));
    script.push(OP_CHECKMULTISIG);
    script
}

/// Build the standard scriptsig for P2PKH/P2PK spends:
/// <sig ‖ sighash byte> <pubkey>
pub fn standard_script_sig(sig_der: &[u8], pubkey_sec: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(sig_der.len() + pubkey_sec.len() + 3);
    script.push((sig_der.len() + 1) as u8);
    script.extend_from_slice(sig_der);
    script.push(SIGHASH_ALL);
    script.push(pubkey_sec.len() as u8);
    script.extend_from_slice(pubkey_sec);
    script
}

/// Build the scriptsig spending a P2SH multisig output:
/// OP_0 <sig1> ... <sigM> OP_PUSHDATA1 <len> <redeem>
pub fn multisig_script_sig(sigs: &[Vec<u8>], redeem: &[u8]) -> Vec<u8> {
    let mut script = Vec::new();
    script.push(OP_0);
    for sig in sigs {
        script.push(sig.len() as u8);
        script.extend_from_slice(sig);
    }
    script.push(OP_PUSHDATA1);
    script.push(redeem.len() as u8);
    script.extend_from_slice(redeem);
    script
}

/// A parsed standard scriptsig
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedScriptSig {
    /// DER signature without the trailing sighash byte
    pub signature: Vec<u8>,
    pub sighash: u8,
    /// SEC-encoded public key
    pub pubkey: Vec<u8>,
}

/// Parse the standard scriptsig form:
/// `<sig-len> 0x30 <rs-len> 0x02 <r-len> <r> 0x02 <s-len> <s> <sighash> <pk-len> <pubkey>`
pub fn parse_script_sig(script: &[u8]) -> Result<ParsedScriptSig, ScriptError> {
    let err = ScriptError::MalformedScriptSig;
    if script.len() < 9 {
        return Err(err);
    }
    let sig_push = script[0] as usize;
    if script.len() < 1 + sig_push || sig_push < 8 {
        return Err(err);
    }
    let sig = &script[1..1 + sig_push];

    // DER envelope: 0x30 <rs-len> 0x02 <r-len> r 0x02 <s-len> s
    if sig[0] != 0x30 {
        return Err(err);
    }
    let rs_len = sig[1] as usize;
    if rs_len + 3 != sig_push {
        // rs body + (0x30, len, sighash)
        return Err(err);
    }
    if sig[2] != 0x02 {
        return Err(err);
    }
    let r_len = sig[3] as usize;
    if 4 + r_len + 2 > sig.len() {
        return Err(err);
    }
    if sig[4 + r_len] != 0x02 {
        return Err(err);
    }
    let s_len = sig[5 + r_len] as usize;
    if 6 + r_len + s_len + 1 != sig_push {
        return Err(err);
    }
    let sighash = sig[sig_push - 1];
    if sighash != SIGHASH_ALL {
        return Err(err);
    }

    let mut pos = 1 + sig_push;
    if pos >= script.len() {
        return Err(err);
    }
    let pk_len = script[pos] as usize;
    pos += 1;
    if pos + pk_len != script.len() {
        return Err(err);
    }
    let pubkey = script[pos..pos + pk_len].to_vec();

    Ok(ParsedScriptSig {
        signature: sig[..sig_push - 1].to_vec(),
        sighash,
        pubkey,
    })
}
