//! Breadth-first neighbour expansion.
//!
//! The walk runs one query per hop over the current frontier. A node is
//! claimed by the first hop (and, within a hop, the lowest relation id) that
//! reaches it and is never expanded twice, so cycles terminate.

use std::collections::{BTreeMap, HashMap, HashSet};

use kg_core::{
  entity::{EntityId, EntityRef, EntityType},
  relation::Relation,
  store::{Neighbor, Neighborhood},
};
use rusqlite::Connection;

use crate::{
  Result,
  ops::{entities_by_ids, id_array, relations_where, resolve},
};

/// How a visited node was first reached.
struct Visit {
  hops: u32,
  via:  Vec<String>,
  path: Vec<EntityId>,
}

pub fn neighbors(
  conn: &Connection,
  reference: &EntityRef,
  max_hops: u32,
  filter_type: Option<EntityType>,
) -> Result<Neighborhood> {
  let origin = resolve(conn, reference)?;

  let mut visited: HashMap<EntityId, Visit> = HashMap::new();
  visited.insert(origin.id, Visit { hops: 0, via: Vec::new(), path: vec![origin.id] });
  let mut crossed: BTreeMap<i64, Relation> = BTreeMap::new();
  let mut frontier: Vec<EntityId> = vec![origin.id];

  for hop in 1..=max_hops {
    if frontier.is_empty() {
      break;
    }
    let in_frontier: HashSet<EntityId> = frontier.iter().copied().collect();
    let clause = "r.source_id IN (SELECT value FROM json_each(?1)) \
       OR (r.target_id IN (SELECT value FROM json_each(?1)) AND r.bidirectional = 1)";
    let params = [id_array(&frontier)];

    let mut next = Vec::new();
    for relation in relations_where(conn, clause, &params)? {
      let mut steps = Vec::with_capacity(2);
      if in_frontier.contains(&relation.source_id) {
        steps.push((relation.source_id, relation.target_id));
      }
      if relation.bidirectional && in_frontier.contains(&relation.target_id) {
        steps.push((relation.target_id, relation.source_id));
      }

      for (from, to) in steps {
        if visited.contains_key(&to) {
          continue;
        }
        let Some(parent) = visited.get(&from) else { continue };
        let mut via = parent.via.clone();
        via.push(relation.relation_type.clone());
        let mut path = parent.path.clone();
        path.push(to);
        visited.insert(to, Visit { hops: hop, via, path });
        next.push(to);
      }
      crossed.entry(relation.id).or_insert(relation);
    }
    frontier = next;
  }

  let ids: Vec<EntityId> = visited
    .keys()
    .copied()
    .filter(|&id| id != origin.id)
    .collect();

  let mut found: Vec<Neighbor> = entities_by_ids(conn, &ids)?
    .into_iter()
    .filter(|e| filter_type.is_none_or(|t| e.entity_type == t))
    .filter_map(|entity| {
      let visit = visited.remove(&entity.id)?;
      Some(Neighbor { entity, hops: visit.hops, via: visit.via, path: visit.path })
    })
    .collect();
  found.sort_by_key(|n| (n.hops, n.entity.id));

  tracing::debug!(
    origin = origin.id,
    max_hops,
    found = found.len(),
    edges = crossed.len(),
    "neighbour expansion"
  );

  Ok(Neighborhood {
    origin,
    neighbors: found,
    relations: crossed.into_values().collect(),
  })
}
