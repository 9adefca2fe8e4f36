//! Transaction Implementation for BLAST
//!
//! Only the parts of a transaction the consensus core touches: the coinbase
//! of a parent-chain block inside an AuxPow and the genesis coinbase. The
//! serialization is the legacy (non-witness) format, so `txid` is the double
//! SHA256 of exactly these bytes.

use std::fmt;
use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};

use blast_crypto::sha256d;

use crate::encode::{self, CodecError};
use crate::Hash;

/// Transaction input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    /// Previous transaction ID
    pub prev_txid: Hash,

    /// Previous transaction output index
    pub prev_vout: u32,

    /// Script signature
    pub script_sig: Vec<u8>,

    /// Sequence number
    pub sequence: u32,
}

impl TransactionInput {
    /// Create a new transaction input
    pub fn new(
        prev_txid: Hash,
        prev_vout: u32,
        script_sig: Vec<u8>,
        sequence: u32,
    ) -> Self {
        TransactionInput {
            prev_txid,
            prev_vout,
            script_sig,
            sequence,
        }
    }

    /// Create a coinbase input carrying an arbitrary script
    pub fn coinbase(script_sig: Vec<u8>) -> Self {
        TransactionInput {
            prev_txid: [0; 32], // Coinbase has all zeros
            prev_vout: 0xffffffff, // Coinbase uses max value
            script_sig,
            sequence: 0xffffffff,
        }
    }

    /// Check if this is a coinbase input
    pub fn is_coinbase(&self) -> bool {
        self.prev_txid == [0; 32] && self.prev_vout == 0xffffffff
    }
}

impl fmt::Display for TransactionInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_coinbase() {
            write!(f, "Coinbase({})", hex::encode(&self.script_sig))
        } else {
            write!(
                f,
                "Input({}:{}, sig: {} bytes)",
                hex::encode(&self.prev_txid[0..4]),
                self.prev_vout,
                self.script_sig.len()
            )
        }
    }
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    /// Output value in smallest units
    pub value: i64,

    /// Script public key
    pub script_pubkey: Vec<u8>,
}

impl TransactionOutput {
    /// Create a new transaction output
    pub fn new(value: i64, script_pubkey: Vec<u8>) -> Self {
        TransactionOutput {
            value,
            script_pubkey,
        }
    }
}

impl fmt::Display for TransactionOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Output({} units, script: {} bytes)",
            self.value,
            self.script_pubkey.len()
        )
    }
}

/// Transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction version
    pub version: i32,

    /// Transaction inputs
    pub inputs: Vec<TransactionInput>,

    /// Transaction outputs
    pub outputs: Vec<TransactionOutput>,

    /// Lock time
    pub lock_time: u32,
}

impl Transaction {
    /// Create a new transaction
    pub fn new(
        version: i32,
        inputs: Vec<TransactionInput>,
        outputs: Vec<TransactionOutput>,
        lock_time: u32,
    ) -> Self {
        Transaction {
            version,
            inputs,
            outputs,
            lock_time,
        }
    }

    /// Create a version 1 coinbase transaction
    pub fn coinbase(script_sig: Vec<u8>, outputs: Vec<TransactionOutput>) -> Self {
        Transaction {
            version: 1,
            inputs: vec![TransactionInput::coinbase(script_sig)],
            outputs,
            lock_time: 0,
        }
    }

    /// Check if this is a coinbase transaction
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase()
    }

    /// Append the consensus serialization to `buf`
    pub fn encode(&self, buf: &mut Vec<u8>) {
        encode::put_i32(buf, self.version);

        encode::put_compact_size(buf, self.inputs.len() as u64);
        for input in &self.inputs {
            encode::put_hash(buf, &input.prev_txid);
            encode::put_u32(buf, input.prev_vout);
            encode::put_var_bytes(buf, &input.script_sig);
            encode::put_u32(buf, input.sequence);
        }

        encode::put_compact_size(buf, self.outputs.len() as u64);
        for output in &self.outputs {
            encode::put_i64(buf, output.value);
            encode::put_var_bytes(buf, &output.script_pubkey);
        }

        encode::put_u32(buf, self.lock_time);
    }

    /// Consensus serialization
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }

    /// Decode a transaction from the consensus serialization
    pub fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        let version = reader.read_i32::<LittleEndian>()?;

        let input_count = encode::read_compact_size(reader)?;
        let mut inputs = Vec::with_capacity(input_count.min(64) as usize);
        for _ in 0..input_count {
            let prev_txid = encode::read_hash(reader)?;
            let prev_vout = reader.read_u32::<LittleEndian>()?;
            let script_sig = encode::read_var_bytes(reader)?;
            let sequence = reader.read_u32::<LittleEndian>()?;
            inputs.push(TransactionInput::new(prev_txid, prev_vout, script_sig, sequence));
        }

        let output_count = encode::read_compact_size(reader)?;
        let mut outputs = Vec::with_capacity(output_count.min(64) as usize);
        for _ in 0..output_count {
            let value = reader.read_i64::<LittleEndian>()?;
            let script_pubkey = encode::read_var_bytes(reader)?;
            outputs.push(TransactionOutput::new(value, script_pubkey));
        }

        let lock_time = reader.read_u32::<LittleEndian>()?;

        Ok(Transaction {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    /// Transaction ID (double SHA256 of the serialization)
    pub fn txid(&self) -> Hash {
        sha256d(&self.serialize())
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tx {{ id: {}, ins: {}, outs: {} }}",
            blast_util::hash_to_hex(&self.txid()),
            self.inputs.len(),
            self.outputs.len()
        )
    }
}
