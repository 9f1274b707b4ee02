//! `funcSignature`: RSA signatures over the action input.
//!
//! Keys are declared once in the manifest `keys` section as base64 PKCS#8
//! DER and parsed into a [`KeyRing`] when the chains are built, so a bad key
//! stops the gateway at startup instead of failing requests.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use wrench_config::{ActionSettings, Manifest, SignAlgorithm};

use super::{ActionError, ActionExecutor, ActionOutput, ActionRequest};
use crate::BuildError;

/// Private keys by id.
#[derive(Clone, Default)]
pub struct KeyRing {
    keys: HashMap<String, Arc<RsaPrivateKey>>,
}

impl fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        ids.sort_unstable();
        f.debug_struct("KeyRing").field("ids", &ids).finish()
    }
}

impl KeyRing {
    /// Creates an empty ring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses every key of the manifest.
    pub fn from_manifest(manifest: &Manifest) -> Result<Self, BuildError> {
        manifest.keys.iter().try_fold(Self::new(), |ring, key| {
            ring.with_der_base64(&key.id, &key.private_rsa_key_der_base64)
        })
    }

    /// Adds a key given as base64 PKCS#8 DER.
    pub fn with_der_base64(mut self, id: &str, der_base64: &str) -> Result<Self, BuildError> {
        let der = STANDARD
            .decode(der_base64.trim())
            .map_err(|e| BuildError::invalid_key(id, format!("read key: {e}")))?;
        let key = RsaPrivateKey::from_pkcs8_der(&der)
            .map_err(|e| BuildError::invalid_key(id, format!("parse key: {e}")))?;
        self.keys.insert(id.to_string(), Arc::new(key));
        Ok(self)
    }

    /// Finds a key.
    pub fn get(&self, id: &str) -> Option<&Arc<RsaPrivateKey>> {
        self.keys.get(id)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the ring holds no key.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// `funcSignature`: base64 RSA PKCS#1 v1.5 signature of the action input.
#[derive(Clone)]
pub struct SignatureExecutor {
    key_id: String,
    signer: SigningKey<Sha256>,
}

impl fmt::Debug for SignatureExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureExecutor")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl SignatureExecutor {
    /// Creates the executor for a `funcSignature` action.
    pub fn from_settings(settings: &ActionSettings, keys: &KeyRing) -> Result<Self, BuildError> {
        let sign = settings
            .func
            .as_ref()
            .and_then(|f| f.sign.as_ref())
            .ok_or_else(|| BuildError::invalid_action(&settings.id, "func.sign is required"))?;
        let key = keys
            .get(&sign.key_id)
            .ok_or_else(|| BuildError::UnknownKey {
                action_id: settings.id.clone(),
                key_id: sign.key_id.clone(),
            })?;

        let signer = match sign.alg {
            SignAlgorithm::Sha256 => SigningKey::<Sha256>::new(RsaPrivateKey::clone(key)),
        };
        Ok(Self {
            key_id: sign.key_id.clone(),
            signer,
        })
    }
}

#[async_trait]
impl ActionExecutor for SignatureExecutor {
    async fn execute(&self, request: ActionRequest<'_>) -> Result<ActionOutput, ActionError> {
        let signature = self
            .signer
            .try_sign(request.body)
            .map_err(|e| ActionError::internal(format!("sign with key {}: {e}", self.key_id)))?;
        Ok(ActionOutput::body(STANDARD.encode(signature.to_vec())).with_content_type("text/plain"))
    }
}
