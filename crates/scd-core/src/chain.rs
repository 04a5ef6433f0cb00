//! Composing latest-version queries across pinned references.
//!
//! A reference field stores the uid of one specific version of its target.
//! "Children whose parent matches Q" therefore means: resolve the parent's
//! latest rows matching Q, collect their uids, and select the children's
//! latest rows whose reference is in that set. A child pointing at an older
//! version of a parent is not a child of the parent's *current* state and is
//! left out.

use std::collections::{BTreeSet, HashMap};

use crate::{
  Error, Result,
  predicate::Predicate,
  repository::Repository,
  row::Row,
  store::VersionStore,
};

struct Hop<'r, S> {
  repository: &'r Repository<S>,
  field:      String,
  filter:     Option<Predicate>,
}

/// A multi-hop query: start from the latest rows of one entity and walk
/// reference fields outward.
///
/// ```rust,ignore
/// let items = Chain::from(&jobs, Predicate::eq("contractor_id", "cont_001"))
///   .then(&payments, "job_uid", Some(Predicate::created_between(start, end)))
///   .run()
///   .await?;
/// ```
pub struct Chain<'r, S> {
  root:        &'r Repository<S>,
  root_filter: Predicate,
  hops:        Vec<Hop<'r, S>>,
}

impl<'r, S: VersionStore> Chain<'r, S> {
  pub fn from(root: &'r Repository<S>, filter: Predicate) -> Self {
    Self { root, root_filter: filter, hops: Vec::new() }
  }

  /// Follow `field` on `child`, which must reference the previous hop's
  /// entity, optionally filtering the child's latest rows further.
  pub fn then(
    mut self,
    child: &'r Repository<S>,
    field: &str,
    filter: Option<Predicate>,
  ) -> Self {
    self.hops.push(Hop { repository: child, field: field.to_owned(), filter });
    self
  }

  /// Run every hop in order and return the latest rows of the last one.
  pub async fn run(self) -> Result<Vec<Row>> {
    self.check_links()?;

    let mut rows = self.root.get_latest_where(&self.root_filter).await?;
    for hop in &self.hops {
      if rows.is_empty() {
        break;
      }
      let uids: BTreeSet<String> = rows.into_iter().map(|r| r.uid).collect();
      let mut predicate = Predicate::reference_in(&hop.field, uids);
      if let Some(filter) = &hop.filter {
        predicate = predicate.and(filter.clone());
      }
      rows = hop.repository.get_latest_where(&predicate).await?;
    }
    Ok(rows)
  }

  fn check_links(&self) -> Result<()> {
    let mut parent = self.root.entity();
    for hop in &self.hops {
      let child = hop.repository.descriptor();
      let target = child
        .field(&hop.field)
        .filter(|f| f.is_reference())
        .and_then(|f| f.target.as_ref());
      match target {
        Some(t) if t.entity() == parent => parent = child.entity(),
        Some(t) => {
          return Err(Error::validation(
            child.entity(),
            hop.field.as_str(),
            format!("references {}, not {parent}", t.entity()),
          ));
        }
        None => {
          return Err(Error::validation(
            child.entity(),
            hop.field.as_str(),
            "is not a reference field",
          ));
        }
      }
    }
    Ok(())
  }
}

/// The single-hop form: latest children whose `field` points at the uid of a
/// latest parent matching `parent_filter`, with `child_filter` applied to the
/// children afterwards.
pub async fn latest_referencing<S: VersionStore>(
  parent: &Repository<S>,
  parent_filter: Predicate,
  child: &Repository<S>,
  field: &str,
  child_filter: Option<Predicate>,
) -> Result<Vec<Row>> {
  Chain::from(parent, parent_filter)
    .then(child, field, child_filter)
    .run()
    .await
}

/// For each uid that `children` reference through `field`, the *current*
/// latest row of the referenced logical entity.
///
/// Two store round trips regardless of how many children there are: one to
/// map the pinned uids to logical ids, one to resolve those ids' latest rows.
pub async fn resolve_references<S: VersionStore>(
  children: &[Row],
  field: &str,
  parent: &Repository<S>,
) -> Result<HashMap<String, Row>> {
  let uids: Vec<String> = children
    .iter()
    .filter_map(|r| r.str_field(field))
    .map(str::to_owned)
    .collect::<BTreeSet<_>>()
    .into_iter()
    .collect();
  if uids.is_empty() {
    return Ok(HashMap::new());
  }

  let pinned = parent
    .store()
    .rows_by_uid(parent.descriptor(), &uids)
    .await?;
  let ids: Vec<String> = pinned
    .iter()
    .map(|r| r.logical_id.clone())
    .collect::<BTreeSet<_>>()
    .into_iter()
    .collect();
  let latest: HashMap<String, Row> = parent
    .get_latest_many(&ids)
    .await?
    .into_iter()
    .map(|r| (r.logical_id.clone(), r))
    .collect();

  Ok(
    pinned
      .into_iter()
      .filter_map(|p| latest.get(&p.logical_id).map(|l| (p.uid, l.clone())))
      .collect(),
  )
}
