#![forbid(unsafe_code)]

//! Enveloped signature transform.
//!
//! Removes the `<Signature>` element being processed, with all of its
//! descendants, from the node set.

use crate::pipeline::{Transform, TransformData};
use samlguard_core::{algorithm, Error};
use samlguard_xml::NodeId;

pub struct EnvelopedSignatureTransform {
    signature: NodeId,
}

impl EnvelopedSignatureTransform {
    pub fn new(signature: NodeId) -> Self {
        Self { signature }
    }
}

impl Transform for EnvelopedSignatureTransform {
    fn uri(&self) -> &str {
        algorithm::ENVELOPED_SIGNATURE
    }

    fn execute<'t>(&self, input: TransformData<'t>) -> Result<TransformData<'t>, Error> {
        match input {
            TransformData::Xml { tree, mut node_set } => {
                node_set.remove_subtree(self.signature, tree);
                Ok(TransformData::Xml { tree, node_set })
            }
            TransformData::Binary(_) => Err(Error::Transform(
                "enveloped-signature transform requires XML input".into(),
            )),
        }
    }
}
