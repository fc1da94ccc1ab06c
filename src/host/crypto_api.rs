//! Cryptographic intrinsics: digests and their assert variants, the
//! BLAKE2b compression function, alt_bn128 curve operations, modular
//! exponentiation, and secp256k1 key recovery.

use anyhow::Result;
use num_bigint::BigUint;
use ripemd::Ripemd160;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use sha3::{Keccak256, Sha3_256};
use substrate_bn as bn;
use substrate_bn::Group;
use wasmtime::{Caller, Linker};

use super::{memory, HostEnv};
use crate::errors::host_assert;
use crate::memory::MemoryView;

// ---- pure helpers (exercised directly by unit tests) ----

pub(crate) fn blake2b_compress(
    rounds: u32,
    h: &mut [u64; 8],
    m: &[u64; 16],
    t: [u64; 2],
    last: bool,
) {
    const IV: [u64; 8] = [
        0x6a09e667f3bcc908,
        0xbb67ae8584caa73b,
        0x3c6ef372fe94f82b,
        0xa54ff53a5f1d36f1,
        0x510e527fade682d1,
        0x9b05688c2b3e6c1f,
        0x1f83d9abfb41bd6b,
        0x5be0cd19137e2179,
    ];
    const SIGMA: [[usize; 16]; 10] = [
        [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
        [14, 10, 4, 8, 9, 15, 13, 6, 1, 12, 0, 2, 11, 7, 5, 3],
        [11, 8, 12, 0, 5, 2, 15, 13, 10, 14, 3, 6, 7, 1, 9, 4],
        [7, 9, 3, 1, 13, 12, 11, 14, 2, 6, 5, 10, 4, 0, 15, 8],
        [9, 0, 5, 7, 2, 4, 10, 15, 14, 1, 11, 12, 6, 8, 3, 13],
        [2, 12, 6, 10, 0, 11, 8, 3, 4, 13, 7, 5, 15, 14, 1, 9],
        [12, 5, 1, 15, 14, 13, 4, 10, 0, 7, 6, 3, 9, 2, 8, 11],
        [13, 11, 7, 14, 12, 1, 3, 9, 5, 0, 15, 4, 8, 6, 2, 10],
        [6, 15, 14, 9, 11, 3, 0, 8, 12, 2, 13, 7, 1, 4, 10, 5],
        [10, 2, 8, 4, 7, 6, 1, 5, 15, 11, 9, 14, 3, 12, 13, 0],
    ];

    #[inline]
    fn g(v: &mut [u64; 16], a: usize, b: usize, c: usize, d: usize, x: u64, y: u64) {
        v[a] = v[a].wrapping_add(v[b]).wrapping_add(x);
        v[d] = (v[d] ^ v[a]).rotate_right(32);
        v[c] = v[c].wrapping_add(v[d]);
        v[b] = (v[b] ^ v[c]).rotate_right(24);
        v[a] = v[a].wrapping_add(v[b]).wrapping_add(y);
        v[d] = (v[d] ^ v[a]).rotate_right(16);
        v[c] = v[c].wrapping_add(v[d]);
        v[b] = (v[b] ^ v[c]).rotate_right(63);
    }

    let mut v = [0u64; 16];
    v[..8].copy_from_slice(h);
    v[8..].copy_from_slice(&IV);
    v[12] ^= t[0];
    v[13] ^= t[1];
    if last {
        v[14] = !v[14];
    }
    for i in 0..rounds as usize {
        let s = &SIGMA[i % 10];
        g(&mut v, 0, 4, 8, 12, m[s[0]], m[s[1]]);
        g(&mut v, 1, 5, 9, 13, m[s[2]], m[s[3]]);
        g(&mut v, 2, 6, 10, 14, m[s[4]], m[s[5]]);
        g(&mut v, 3, 7, 11, 15, m[s[6]], m[s[7]]);
        g(&mut v, 0, 5, 10, 15, m[s[8]], m[s[9]]);
        g(&mut v, 1, 6, 11, 12, m[s[10]], m[s[11]]);
        g(&mut v, 2, 7, 8, 13, m[s[12]], m[s[13]]);
        g(&mut v, 3, 4, 9, 14, m[s[14]], m[s[15]]);
    }
    for i in 0..8 {
        h[i] ^= v[i] ^ v[i + 8];
    }
}

fn parse_g1(bytes: &[u8]) -> Option<bn::G1> {
    if bytes.len() != 64 {
        return None;
    }
    let x = bn::Fq::from_slice(&bytes[0..32]).ok()?;
    let y = bn::Fq::from_slice(&bytes[32..64]).ok()?;
    if x == bn::Fq::zero() && y == bn::Fq::zero() {
        Some(bn::G1::zero())
    } else {
        Some(bn::AffineG1::new(x, y).ok()?.into())
    }
}

fn serialize_g1(point: bn::G1) -> [u8; 64] {
    let mut out = [0u8; 64];
    if let Some(affine) = bn::AffineG1::from_jacobian(point) {
        affine.x().to_big_endian(&mut out[0..32]).unwrap();
        affine.y().to_big_endian(&mut out[32..64]).unwrap();
    }
    out
}

pub(crate) fn bn128_add(op1: &[u8], op2: &[u8]) -> Option<[u8; 64]> {
    let a = parse_g1(op1)?;
    let b = parse_g1(op2)?;
    Some(serialize_g1(a + b))
}

pub(crate) fn bn128_mul(point: &[u8], scalar: &[u8]) -> Option<[u8; 64]> {
    let p = parse_g1(point)?;
    if scalar.len() != 32 {
        return None;
    }
    let s = bn::Fr::from_slice(scalar).ok()?;
    Some(serialize_g1(p * s))
}

/// Pairs of (G1, G2) points, 192 bytes each; true iff the pairing product
/// is the identity.
pub(crate) fn bn128_pair(input: &[u8]) -> Option<bool> {
    if input.len() % 192 != 0 {
        return None;
    }
    let mut pairs = Vec::with_capacity(input.len() / 192);
    for chunk in input.chunks_exact(192) {
        let a = parse_g1(&chunk[0..64])?;
        let b_x_c1 = bn::Fq::from_slice(&chunk[64..96]).ok()?;
        let b_x_c0 = bn::Fq::from_slice(&chunk[96..128]).ok()?;
        let b_y_c1 = bn::Fq::from_slice(&chunk[128..160]).ok()?;
        let b_y_c0 = bn::Fq::from_slice(&chunk[160..192]).ok()?;
        let b_x = bn::Fq2::new(b_x_c0, b_x_c1);
        let b_y = bn::Fq2::new(b_y_c0, b_y_c1);
        let b = if b_x.is_zero() && b_y.is_zero() {
            bn::G2::zero()
        } else {
            bn::AffineG2::new(b_x, b_y).ok()?.into()
        };
        pairs.push((a, b));
    }
    Some(bn::pairing_batch(&pairs) == bn::Gt::one())
}

pub(crate) fn mod_exp_be(base: &[u8], exp: &[u8], modulus: &[u8]) -> Option<Vec<u8>> {
    let m = BigUint::from_bytes_be(modulus);
    if m == BigUint::default() {
        return None;
    }
    let result = BigUint::from_bytes_be(base).modpow(&BigUint::from_bytes_be(exp), &m);
    let bytes = result.to_bytes_be();
    let mut out = vec![0u8; modulus.len()];
    out[modulus.len() - bytes.len()..].copy_from_slice(&bytes);
    Some(out)
}

pub(crate) fn recover_k1(digest: &[u8; 32], recid: u8, rs: &[u8; 64]) -> Result<PublicKey> {
    let rid = RecoveryId::from_i32(recid as i32)?;
    let sig = RecoverableSignature::from_compact(rs, rid)?;
    let msg = Message::from_digest(*digest);
    Ok(Secp256k1::new().recover_ecdsa(&msg, &sig)?)
}

// ---- linker registration ----

/// Digest + assert-digest pair for one hash function.
fn link_hash<const N: usize>(
    linker: &mut Linker<HostEnv>,
    name: &'static str,
    assert_name: &'static str,
    hash: fn(&[u8]) -> [u8; N],
) -> Result<()> {
    linker.func_wrap(
        "env",
        name,
        move |mut caller: Caller<'_, HostEnv>, data: i32, len: i32, out: i32| -> Result<()> {
            let mem = memory(&mut caller)?;
            let (mem_data, _env) = mem.data_and_store_mut(&mut caller);
            let mut view = MemoryView::new(mem_data);
            let digest = hash(view.slice(data, len as u32)?);
            view.write(out, &digest)
        },
    )?;
    linker.func_wrap(
        "env",
        assert_name,
        move |mut caller: Caller<'_, HostEnv>, data: i32, len: i32, expected: i32| -> Result<()> {
            let mem = memory(&mut caller)?;
            let (mem_data, _env) = mem.data_and_store_mut(&mut caller);
            let view = MemoryView::new(mem_data);
            let digest = hash(view.slice(data, len as u32)?);
            let expected: [u8; N] = view.read_array(expected)?;
            host_assert(digest == expected, "hash mismatch")
        },
    )?;
    Ok(())
}

pub fn link(linker: &mut Linker<HostEnv>) -> Result<()> {
    link_hash::<32>(linker, "sha256", "assert_sha256", |d| Sha256::digest(d).into())?;
    link_hash::<20>(linker, "sha1", "assert_sha1", |d| Sha1::digest(d).into())?;
    link_hash::<64>(linker, "sha512", "assert_sha512", |d| Sha512::digest(d).into())?;
    link_hash::<20>(linker, "ripemd160", "assert_ripemd160", |d| Ripemd160::digest(d).into())?;

    linker.func_wrap(
        "env",
        "sha3",
        |mut caller: Caller<'_, HostEnv>, data: i32, data_len: i32, out: i32, out_len: i32, keccak: i32| -> Result<()> {
            let mem = memory(&mut caller)?;
            let (mem_data, _env) = mem.data_and_store_mut(&mut caller);
            let mut view = MemoryView::new(mem_data);
            let input = view.slice(data, data_len as u32)?;
            let digest: [u8; 32] = if keccak != 0 {
                Keccak256::digest(input).into()
            } else {
                Sha3_256::digest(input).into()
            };
            let copy = (out_len as u32 as usize).min(32);
            view.write(out, &digest[..copy])
        },
    )?;

    linker.func_wrap(
        "env",
        "blake2_f",
        |mut caller: Caller<'_, HostEnv>,
         rounds: i32,
         state: i32,
         state_len: i32,
         message: i32,
         message_len: i32,
         t0: i32,
         t0_len: i32,
         t1: i32,
         t1_len: i32,
         last: i32,
         out: i32,
         out_len: i32|
         -> Result<i32> {
            if state_len != 64 || message_len != 128 || t0_len != 8 || t1_len != 8 || out_len != 64 {
                return Ok(-1);
            }
            if last != 0 && last != 1 {
                return Ok(-1);
            }
            let mem = memory(&mut caller)?;
            let (mem_data, _env) = mem.data_and_store_mut(&mut caller);
            let mut view = MemoryView::new(mem_data);
            let state_bytes: [u8; 64] = view.read_array(state)?;
            let message_bytes: [u8; 128] = view.read_array(message)?;
            let t = [view.read_u64(t0)?, view.read_u64(t1)?];

            let mut h = [0u64; 8];
            for (i, word) in h.iter_mut().enumerate() {
                *word = u64::from_le_bytes(state_bytes[i * 8..i * 8 + 8].try_into().unwrap());
            }
            let mut m = [0u64; 16];
            for (i, word) in m.iter_mut().enumerate() {
                *word = u64::from_le_bytes(message_bytes[i * 8..i * 8 + 8].try_into().unwrap());
            }

            blake2b_compress(rounds as u32, &mut h, &m, t, last == 1);

            let mut result = [0u8; 64];
            for (i, word) in h.iter().enumerate() {
                result[i * 8..i * 8 + 8].copy_from_slice(&word.to_le_bytes());
            }
            view.write(out, &result)?;
            Ok(0)
        },
    )?;

    linker.func_wrap(
        "env",
        "alt_bn128_add",
        |mut caller: Caller<'_, HostEnv>, op1: i32, op1_len: i32, op2: i32, op2_len: i32, result: i32, result_len: i32| -> Result<i32> {
            let mem = memory(&mut caller)?;
            let (mem_data, _env) = mem.data_and_store_mut(&mut caller);
            let mut view = MemoryView::new(mem_data);
            if result_len < 64 {
                return Ok(-1);
            }
            let a = view.slice(op1, op1_len as u32)?.to_vec();
            let b = view.slice(op2, op2_len as u32)?.to_vec();
            match bn128_add(&a, &b) {
                Some(sum) => {
                    view.write(result, &sum)?;
                    Ok(0)
                }
                None => Ok(-1),
            }
        },
    )?;

    linker.func_wrap(
        "env",
        "alt_bn128_mul",
        |mut caller: Caller<'_, HostEnv>, g1: i32, g1_len: i32, scalar: i32, scalar_len: i32, result: i32, result_len: i32| -> Result<i32> {
            let mem = memory(&mut caller)?;
            let (mem_data, _env) = mem.data_and_store_mut(&mut caller);
            let mut view = MemoryView::new(mem_data);
            if result_len < 64 {
                return Ok(-1);
            }
            let p = view.slice(g1, g1_len as u32)?.to_vec();
            let s = view.slice(scalar, scalar_len as u32)?.to_vec();
            match bn128_mul(&p, &s) {
                Some(product) => {
                    view.write(result, &product)?;
                    Ok(0)
                }
                None => Ok(-1),
            }
        },
    )?;

    linker.func_wrap(
        "env",
        "alt_bn128_pair",
        |mut caller: Caller<'_, HostEnv>, ops: i32, ops_len: i32| -> Result<i32> {
            let mem = memory(&mut caller)?;
            let (mem_data, _env) = mem.data_and_store_mut(&mut caller);
            let view = MemoryView::new(mem_data);
            let input = view.slice(ops, ops_len as u32)?;
            match bn128_pair(input) {
                Some(true) => Ok(1),
                Some(false) => Ok(0),
                None => Ok(-1),
            }
        },
    )?;

    linker.func_wrap(
        "env",
        "mod_exp",
        |mut caller: Caller<'_, HostEnv>, base: i32, base_len: i32, exp: i32, exp_len: i32, modulus: i32, mod_len: i32, out: i32, out_len: i32| -> Result<i32> {
            let mem = memory(&mut caller)?;
            let (mem_data, _env) = mem.data_and_store_mut(&mut caller);
            let mut view = MemoryView::new(mem_data);
            if out_len != mod_len {
                return Ok(-1);
            }
            let base = view.slice(base, base_len as u32)?.to_vec();
            let exp = view.slice(exp, exp_len as u32)?.to_vec();
            let modulus = view.slice(modulus, mod_len as u32)?.to_vec();
            match mod_exp_be(&base, &exp, &modulus) {
                Some(result) => {
                    view.write(out, &result)?;
                    Ok(0)
                }
                None => Ok(-1),
            }
        },
    )?;

    linker.func_wrap(
        "env",
        "recover_key",
        |mut caller: Caller<'_, HostEnv>, digest: i32, sig: i32, sig_len: i32, pubkey: i32, pub_len: i32| -> Result<i32> {
            let mem = memory(&mut caller)?;
            let (mem_data, _env) = mem.data_and_store_mut(&mut caller);
            let mut view = MemoryView::new(mem_data);
            let digest: [u8; 32] = view.read_array(digest)?;
            host_assert(sig_len == 66, "invalid signature length")?;
            let sig_bytes = view.slice(sig, 66)?;
            // layout: type byte (0 = k1), v = recid + 27 (+4 compressed), r || s
            host_assert(sig_bytes[0] == 0, "unsupported signature type")?;
            let recid = sig_bytes[1].wrapping_sub(27) & 0x3;
            let rs: [u8; 64] = sig_bytes[2..66].try_into().unwrap();
            let key = recover_k1(&digest, recid, &rs)
                .map_err(|_| crate::errors::HostError::Assert("unrecoverable key".to_string()))?;
            let mut out = [0u8; 34];
            out[1..].copy_from_slice(&key.serialize());
            host_assert(pub_len >= 34, "output buffer too small")?;
            view.write(pubkey, &out)?;
            Ok(34)
        },
    )?;

    linker.func_wrap(
        "env",
        "assert_recover_key",
        |mut caller: Caller<'_, HostEnv>, digest: i32, sig: i32, sig_len: i32, pubkey: i32, pub_len: i32| -> Result<()> {
            let mem = memory(&mut caller)?;
            let (mem_data, _env) = mem.data_and_store_mut(&mut caller);
            let view = MemoryView::new(mem_data);
            let digest: [u8; 32] = view.read_array(digest)?;
            host_assert(sig_len == 66, "invalid signature length")?;
            host_assert(pub_len == 34, "invalid public key length")?;
            let sig_bytes = view.slice(sig, 66)?;
            host_assert(sig_bytes[0] == 0, "unsupported signature type")?;
            let recid = sig_bytes[1].wrapping_sub(27) & 0x3;
            let rs: [u8; 64] = sig_bytes[2..66].try_into().unwrap();
            let key = recover_k1(&digest, recid, &rs)
                .map_err(|_| crate::errors::HostError::Assert("unrecoverable key".to_string()))?;
            let expected = view.slice(pubkey, 34)?;
            let mut actual = [0u8; 34];
            actual[1..].copy_from_slice(&key.serialize());
            host_assert(expected == actual.as_slice(), "expected key different than recovered key")
        },
    )?;

    linker.func_wrap(
        "env",
        "k1_recover",
        |mut caller: Caller<'_, HostEnv>, sig: i32, sig_len: i32, digest: i32, dig_len: i32, pubkey: i32, pub_len: i32| -> Result<i32> {
            let mem = memory(&mut caller)?;
            let (mem_data, _env) = mem.data_and_store_mut(&mut caller);
            let mut view = MemoryView::new(mem_data);
            if sig_len != 65 || dig_len != 32 || pub_len < 65 {
                return Ok(-1);
            }
            let sig_bytes = view.slice(sig, 65)?.to_vec();
            let digest: [u8; 32] = view.read_array(digest)?;
            // Ethereum layout: v in [27, 35), then r || s.
            let v = sig_bytes[0];
            if !(27..35).contains(&v) {
                return Ok(-1);
            }
            let recid = (v - 27) & 0x3;
            let rs: [u8; 64] = sig_bytes[1..65].try_into().unwrap();
            match recover_k1(&digest, recid, &rs) {
                Ok(key) => {
                    view.write(pubkey, &key.serialize_uncompressed())?;
                    Ok(0)
                }
                Err(_) => Ok(-1),
            }
        },
    )?;

    Ok(())
}
