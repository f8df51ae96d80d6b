//! Resource access policy documents and the high-level flags they encode.
//!
//! Flags are written as well-known statements and read back by scanning for
//! those statement identifiers only. The round trip is lossy: a document
//! edited by hand keeps whatever semantics it has, but the flags reported for
//! it depend solely on which of the identifiers below are present.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ProvisionError;
use crate::tags::{NAME_TAG, RESOURCE_NAME_TAG, TagKeys};

/// Policy language version written into every document.
pub const POLICY_VERSION: &str = "2012-10-17";

/// Identifier of generated resource policies.
pub const RESOURCE_POLICY_ID: &str = "fsorch-resource-policy";

/// Statement identifier encoding `enforce_encrypted_transport`.
pub const DENY_UNENCRYPTED_TRANSPORT_SID: &str = "DenyUnencryptedTransport";

/// Statement identifier encoding `allow_anonymous_access = false`.
pub const DENY_ANONYMOUS_ACCESS_SID: &str = "DenyAnonymousAccess";

/// Statement identifier encoding `allow_execution_role`.
pub const ALLOW_EXECUTION_ROLE_SID: &str = "AllowECSAccessFromHomeSpace";

const ADMIN_POLICY_SID: &str = "AllowActionsOnVolumesInSpaceAndOrg";
const CLIENT_ROOT_ACCESS: &str = "elasticfilesystem:ClientRootAccess";
const CLIENT_WRITE: &str = "elasticfilesystem:ClientWrite";
const CLIENT_MOUNT: &str = "elasticfilesystem:ClientMount";
const ACCESSED_VIA_MOUNT_TARGET: &str = "elasticfilesystem:AccessedViaMountTarget";
const SECURE_TRANSPORT: &str = "aws:SecureTransport";

/// High-level access controls applied to a filesystem.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct AccessPolicyFlags {
    /// Allow clients without identity-based authorization to mount.
    pub allow_anonymous_access: bool,
    /// Deny any request not made over an encrypted transport.
    pub enforce_encrypted_transport: bool,
    /// Allow the space's task execution role to mount and write.
    pub allow_execution_role: bool,
}

/// Statement effect.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum Effect {
    /// Grants the listed actions.
    #[default]
    Allow,
    /// Denies the listed actions.
    Deny,
}

/// Condition block: operator → key → accepted values.
pub type Condition = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// A policy field written either as a single value or as a list.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    OneOrMany::deserialize(deserializer).map(OneOrMany::into_vec)
}

fn principal_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Principal {
        Anyone(String),
        Map(BTreeMap<String, OneOrMany<String>>),
    }

    Ok(match Principal::deserialize(deserializer)? {
        Principal::Anyone(who) => principal(who),
        Principal::Map(map) => map
            .into_iter()
            .map(|(kind, values)| (kind, values.into_vec()))
            .collect(),
    })
}

fn condition_map<'de, D>(deserializer: D) -> Result<Condition, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, BTreeMap<String, OneOrMany<String>>>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(operator, keys)| {
            let values = keys
                .into_iter()
                .map(|(key, accepted)| (key, accepted.into_vec()))
                .collect();
            (operator, values)
        })
        .collect())
}

/// One statement of a policy document.
///
/// Decoding accepts the scalar shorthand of the policy grammar: a single
/// action, resource, principal value or condition value, and `"*"` as the
/// whole principal. Encoding always writes lists.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    /// Statement identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sid: String,
    /// Allow or deny.
    #[serde(default)]
    pub effect: Effect,
    /// Principal map, for example `{"AWS": ["*"]}`.
    #[serde(
        default,
        deserialize_with = "principal_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub principal: BTreeMap<String, Vec<String>>,
    /// Actions covered by the statement.
    #[serde(default, deserialize_with = "one_or_many")]
    pub action: Vec<String>,
    /// Resources covered by the statement.
    #[serde(default, deserialize_with = "one_or_many")]
    pub resource: Vec<String>,
    /// Optional conditions.
    #[serde(
        default,
        deserialize_with = "condition_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub condition: Condition,
}

/// Policy document.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    /// Policy language version.
    #[serde(default)]
    pub version: String,
    /// Optional document identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Statements in evaluation order; a lone statement object is accepted.
    #[serde(default, deserialize_with = "one_or_many")]
    pub statement: Vec<Statement>,
}

impl PolicyDocument {
    /// Serializes the document to compact JSON.
    ///
    /// # Errors
    ///
    /// Returns an internal [`ProvisionError`] when serialization fails.
    pub fn to_json(&self) -> Result<String, ProvisionError> {
        serde_json::to_string(self)
            .map_err(|err| ProvisionError::internal(format!("failed to encode policy document: {err}")))
    }

    /// Parses a JSON policy document.
    ///
    /// # Errors
    ///
    /// Returns an internal [`ProvisionError`] when the text is not a policy
    /// document.
    pub fn from_json(text: &str) -> Result<Self, ProvisionError> {
        serde_json::from_str(text)
            .map_err(|err| ProvisionError::internal(format!("failed to decode policy document: {err}")))
    }

    /// Returns `true` when a statement with the identifier is present.
    #[must_use]
    pub fn has_statement(&self, sid: &str) -> bool {
        self.statement.iter().any(|statement| statement.sid == sid)
    }
}

fn principal(value: String) -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([(String::from("AWS"), vec![value])])
}

fn bool_condition(key: &str, value: &str) -> Condition {
    BTreeMap::from([(
        String::from("Bool"),
        BTreeMap::from([(key.to_owned(), vec![value.to_owned()])]),
    )])
}

fn mount_target_statement(sid: &str, who: String, actions: &[&str], resource_arn: &str) -> Statement {
    Statement {
        sid: sid.to_owned(),
        effect: Effect::Allow,
        principal: principal(who),
        action: actions.iter().map(|action| (*action).to_owned()).collect(),
        resource: vec![resource_arn.to_owned()],
        condition: bool_condition(ACCESSED_VIA_MOUNT_TARGET, "true"),
    }
}

/// Builds the resource policy for `flags`.
///
/// Returns `None` when no flags were supplied or when the flags produce no
/// statements.
#[must_use]
pub fn resource_policy(
    account: &str,
    space: &str,
    resource_arn: &str,
    flags: Option<&AccessPolicyFlags>,
) -> Option<PolicyDocument> {
    let requested = flags?;
    let mut statements = Vec::new();

    if requested.enforce_encrypted_transport {
        statements.push(Statement {
            sid: DENY_UNENCRYPTED_TRANSPORT_SID.to_owned(),
            effect: Effect::Deny,
            principal: principal(String::from("*")),
            action: vec![String::from("*")],
            resource: vec![resource_arn.to_owned()],
            condition: bool_condition(SECURE_TRANSPORT, "false"),
        });
    }

    if requested.allow_execution_role {
        statements.push(mount_target_statement(
            ALLOW_EXECUTION_ROLE_SID,
            format!("arn:aws:iam::{account}:role/{space}-ecsTaskExecution"),
            &[CLIENT_ROOT_ACCESS, CLIENT_WRITE, CLIENT_MOUNT],
            resource_arn,
        ));
    }

    if !requested.allow_anonymous_access {
        statements.push(mount_target_statement(
            DENY_ANONYMOUS_ACCESS_SID,
            String::from("*"),
            &[CLIENT_ROOT_ACCESS, CLIENT_WRITE],
            resource_arn,
        ));
    }

    if statements.is_empty() {
        return None;
    }

    Some(PolicyDocument {
        version: POLICY_VERSION.to_owned(),
        id: Some(RESOURCE_POLICY_ID.to_owned()),
        statement: statements,
    })
}

/// Reconstructs flags from a stored resource policy.
///
/// Empty text yields `None`. A document without statements allows anonymous
/// access and nothing else.
///
/// # Errors
///
/// Returns an internal [`ProvisionError`] when the text is not a policy
/// document.
pub fn flags_from_policy(text: &str) -> Result<Option<AccessPolicyFlags>, ProvisionError> {
    if text.trim().is_empty() {
        return Ok(None);
    }

    let document = PolicyDocument::from_json(text)?;
    Ok(Some(AccessPolicyFlags {
        allow_anonymous_access: !document.has_statement(DENY_ANONYMOUS_ACCESS_SID),
        enforce_encrypted_transport: document.has_statement(DENY_UNENCRYPTED_TRANSPORT_SID),
        allow_execution_role: document.has_statement(ALLOW_EXECUTION_ROLE_SID),
    }))
}

/// Builds the identity policy attached to the per-org admin group.
///
/// Members may use any filesystem whose name, org, and space tags match the
/// corresponding tags on the member itself.
#[must_use]
pub fn admin_policy(keys: &TagKeys) -> PolicyDocument {
    let matches = BTreeMap::from([
        (
            format!("aws:ResourceTag/{NAME_TAG}"),
            vec![format!("${{aws:PrincipalTag/{RESOURCE_NAME_TAG}}}")],
        ),
        (
            format!("aws:ResourceTag/{}", keys.org),
            vec![format!("${{aws:PrincipalTag/{}}}", keys.org)],
        ),
        (
            format!("aws:ResourceTag/{}", keys.space),
            vec![format!("${{aws:PrincipalTag/{}}}", keys.space)],
        ),
    ]);

    PolicyDocument {
        version: POLICY_VERSION.to_owned(),
        id: None,
        statement: vec![Statement {
            sid: ADMIN_POLICY_SID.to_owned(),
            effect: Effect::Allow,
            principal: BTreeMap::new(),
            action: vec![
                CLIENT_ROOT_ACCESS.to_owned(),
                CLIENT_WRITE.to_owned(),
                CLIENT_MOUNT.to_owned(),
            ],
            resource: vec![String::from("*")],
            condition: BTreeMap::from([(String::from("StringEqualsIgnoreCase"), matches)]),
        }],
    }
}
