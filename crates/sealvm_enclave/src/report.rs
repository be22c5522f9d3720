//! Attestation reports and evidence.
//!
//! The report body follows the SGX layout: 384 little-endian bytes with
//! reserved gaps kept zero. Evidence pairs the raw body with an Ed25519
//! signature by the platform's attestation key.

use crate::error::{EnclaveError, EnclaveResult};
use ed25519_dalek::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};

/// Size of a report body in bytes
pub const REPORT_SIZE: usize = 384;

const CPU_SVN: usize = 0;
const MISC_SELECT: usize = 16;
const ATTRIBUTES: usize = 48;
const MR_ENCLAVE: usize = 64;
const MR_SIGNER: usize = 128;
const ISV_PROD_ID: usize = 256;
const ISV_SVN: usize = 258;
const REPORT_DATA: usize = 320;

/// Enclave attributes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportAttributes {
    /// Attribute flags
    pub flags: u64,
    /// Extended feature mask
    pub xfrm: u64,
}

/// Report body binding an enclave measurement to caller-chosen data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnclaveReport {
    /// Security version of the CPU
    pub cpu_svn: [u8; 16],
    /// Extended SSA frame feature selector
    pub misc_select: u32,
    /// Enclave attributes
    pub attributes: ReportAttributes,
    /// Measurement of the enclave code
    pub mr_enclave: [u8; 32],
    /// Measurement of the enclave signer
    pub mr_signer: [u8; 32],
    /// Product identifier
    pub isv_prod_id: u16,
    /// Security version of the enclave
    pub isv_svn: u16,
    /// Data bound into the report; the first half carries the node's
    /// registration public key
    pub report_data: [u8; 64],
}

impl EnclaveReport {
    /// Registration public key carried in the report data
    #[must_use]
    pub fn owner_key(&self) -> [u8; 32] {
        let mut key = [0u8; 32];
        key.copy_from_slice(&self.report_data[..32]);
        key
    }

    /// Serialize to the 384-byte layout
    #[must_use]
    pub fn to_bytes(&self) -> [u8; REPORT_SIZE] {
        let mut out = [0u8; REPORT_SIZE];
        out[CPU_SVN..CPU_SVN + 16].copy_from_slice(&self.cpu_svn);
        out[MISC_SELECT..MISC_SELECT + 4].copy_from_slice(&self.misc_select.to_le_bytes());
        out[ATTRIBUTES..ATTRIBUTES + 8].copy_from_slice(&self.attributes.flags.to_le_bytes());
        out[ATTRIBUTES + 8..ATTRIBUTES + 16].copy_from_slice(&self.attributes.xfrm.to_le_bytes());
        out[MR_ENCLAVE..MR_ENCLAVE + 32].copy_from_slice(&self.mr_enclave);
        out[MR_SIGNER..MR_SIGNER + 32].copy_from_slice(&self.mr_signer);
        out[ISV_PROD_ID..ISV_PROD_ID + 2].copy_from_slice(&self.isv_prod_id.to_le_bytes());
        out[ISV_SVN..ISV_SVN + 2].copy_from_slice(&self.isv_svn.to_le_bytes());
        out[REPORT_DATA..REPORT_DATA + 64].copy_from_slice(&self.report_data);
        out
    }

    /// Parse the 384-byte layout
    ///
    /// # Errors
    ///
    /// Returns error if `bytes` is not exactly one report body
    pub fn parse_from(bytes: &[u8]) -> EnclaveResult<Self> {
        let bytes: &[u8; REPORT_SIZE] = bytes.try_into().map_err(|_| {
            EnclaveError::InvalidReport(format!(
                "expected {} bytes, got {}",
                REPORT_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self {
            cpu_svn: array(bytes, CPU_SVN),
            misc_select: u32::from_le_bytes(array(bytes, MISC_SELECT)),
            attributes: ReportAttributes {
                flags: u64::from_le_bytes(array(bytes, ATTRIBUTES)),
                xfrm: u64::from_le_bytes(array(bytes, ATTRIBUTES + 8)),
            },
            mr_enclave: array(bytes, MR_ENCLAVE),
            mr_signer: array(bytes, MR_SIGNER),
            isv_prod_id: u16::from_le_bytes(array(bytes, ISV_PROD_ID)),
            isv_svn: u16::from_le_bytes(array(bytes, ISV_SVN)),
            report_data: array(bytes, REPORT_DATA),
        })
    }
}

fn array<const N: usize>(bytes: &[u8; REPORT_SIZE], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}

/// Signed report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    /// Report body in the 384-byte layout
    pub report: Vec<u8>,
    /// Ed25519 signature over `report`
    pub signature: Vec<u8>,
    /// Attestation public key that signed it
    pub signer: [u8; 32],
}

impl Evidence {
    /// Check the signature and parse the report
    ///
    /// # Errors
    ///
    /// Returns error if the signer key, signature or report is invalid
    pub fn verify(&self) -> EnclaveResult<EnclaveReport> {
        let key = VerifyingKey::from_bytes(&self.signer)
            .map_err(|_| EnclaveError::InvalidEvidence("invalid signer key".to_string()))?;
        let signature = Signature::from_slice(&self.signature)
            .map_err(|_| EnclaveError::InvalidEvidence("malformed signature".to_string()))?;
        key.verify_strict(&self.report, &signature)
            .map_err(|_| EnclaveError::InvalidEvidence("signature mismatch".to_string()))?;
        EnclaveReport::parse_from(&self.report)
    }

    /// Encode with postcard
    ///
    /// # Errors
    ///
    /// Returns error if encoding fails
    pub fn to_bytes(&self) -> EnclaveResult<Vec<u8>> {
        postcard::to_allocvec(self).map_err(|e| EnclaveError::Internal(e.to_string()))
    }

    /// Decode from postcard
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not valid evidence
    pub fn from_bytes(bytes: &[u8]) -> EnclaveResult<Self> {
        postcard::from_bytes(bytes).map_err(|e| EnclaveError::InvalidEvidence(e.to_string()))
    }
}
