//! `nyuki://` addresses for templates and running instances.
//!
//! ```text
//! nyuki://<template-id>@<holder>[/<instance-id>]
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static URI_REGEX: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^nyuki://(?P<template_id>[\w-]+)@(?P<holder>[\w-]+)(/(?P<instance_id>[\w-]+))?$")
    .expect("uri pattern is valid")
});

/// The string does not follow the `nyuki://` grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid workflow uri: '{0}'")]
pub struct InvalidWorkflowUri(pub String);

/// What an address points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WorkflowRef {
  Template {
    template_id: String,
  },
  Instance {
    template_id: String,
    instance_id: String,
  },
}

impl WorkflowRef {
  pub fn template(template_id: impl Into<String>) -> Self {
    WorkflowRef::Template {
      template_id: template_id.into(),
    }
  }

  pub fn instance(template_id: impl Into<String>, instance_id: impl Into<String>) -> Self {
    WorkflowRef::Instance {
      template_id: template_id.into(),
      instance_id: instance_id.into(),
    }
  }

  pub fn template_id(&self) -> &str {
    match self {
      WorkflowRef::Template { template_id } | WorkflowRef::Instance { template_id, .. } => {
        template_id
      }
    }
  }
}

/// A parsed `nyuki://` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkflowUri {
  pub template_id: String,
  pub holder: String,
  pub instance_id: Option<String>,
}

impl WorkflowUri {
  /// Address a template or instance owned by `holder`.
  pub fn new(reference: WorkflowRef, holder: impl Into<String>) -> Self {
    let (template_id, instance_id) = match reference {
      WorkflowRef::Template { template_id } => (template_id, None),
      WorkflowRef::Instance {
        template_id,
        instance_id,
      } => (template_id, Some(instance_id)),
    };
    Self {
      template_id,
      holder: holder.into(),
      instance_id,
    }
  }

  pub fn parse(uri: &str) -> Result<Self, InvalidWorkflowUri> {
    let captures = URI_REGEX
      .captures(uri)
      .ok_or_else(|| InvalidWorkflowUri(uri.to_string()))?;

    Ok(Self {
      template_id: captures["template_id"].to_string(),
      holder: captures["holder"].to_string(),
      instance_id: captures.name("instance_id").map(|m| m.as_str().to_string()),
    })
  }

  pub fn reference(&self) -> WorkflowRef {
    match &self.instance_id {
      Some(instance_id) => WorkflowRef::instance(&self.template_id, instance_id),
      None => WorkflowRef::template(&self.template_id),
    }
  }
}

impl fmt::Display for WorkflowUri {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "nyuki://{}@{}", self.template_id, self.holder)?;
    if let Some(instance_id) = &self.instance_id {
      write!(f, "/{}", instance_id)?;
    }
    Ok(())
  }
}

impl FromStr for WorkflowUri {
  type Err = InvalidWorkflowUri;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use proptest::prelude::*;

  #[test]
  fn test_format_template() {
    let uri = WorkflowUri::new(WorkflowRef::template("tpl-1"), "workflow");
    assert_eq!(uri.to_string(), "nyuki://tpl-1@workflow");
  }

  #[test]
  fn test_format_instance() {
    let uri = WorkflowUri::new(WorkflowRef::instance("tpl-1", "abc_2"), "workflow");
    assert_eq!(uri.to_string(), "nyuki://tpl-1@workflow/abc_2");
  }

  #[test]
  fn test_parse_instance() {
    let uri: WorkflowUri = "nyuki://tpl-1@workflow/abc".parse().unwrap();
    assert_eq!(uri.template_id, "tpl-1");
    assert_eq!(uri.holder, "workflow");
    assert_eq!(uri.instance_id.as_deref(), Some("abc"));
    assert_eq!(uri.reference(), WorkflowRef::instance("tpl-1", "abc"));
  }

  #[test]
  fn test_parse_rejects_malformed() {
    for bad in [
      "nyuki://bad holder",
      "nyuki://tpl@",
      "http://tpl@holder",
      "nyuki://tpl@holder/",
      "nyuki://tpl@holder/a/b",
      "",
    ] {
      assert_eq!(
        WorkflowUri::parse(bad),
        Err(InvalidWorkflowUri(bad.to_string())),
        "{bad} should be rejected"
      );
    }
  }

  proptest! {
    #[test]
    fn prop_round_trip(
      template_id in "[A-Za-z0-9_-]{1,24}",
      holder in "[A-Za-z0-9_-]{1,24}",
      instance_id in proptest::option::of("[A-Za-z0-9_-]{1,36}"),
    ) {
      let reference = match &instance_id {
        Some(iid) => WorkflowRef::instance(&template_id, iid),
        None => WorkflowRef::template(&template_id),
      };
      let parsed = WorkflowUri::parse(&WorkflowUri::new(reference, &holder).to_string()).unwrap();

      prop_assert_eq!(parsed.template_id, template_id);
      prop_assert_eq!(parsed.holder, holder);
      prop_assert_eq!(parsed.instance_id, instance_id);
    }
  }
}
