//! Query façade over the blocks loaded from one directory.

use std::path::{Path, PathBuf};

use crate::block::{Arena, Attribute, Block, BlockId, BlockKind};
use crate::error::ReferenceError;

/// Blocks of one module instance plus where they came from.
#[derive(Debug, Clone)]
pub struct ModuleData {
    pub(crate) root_path: PathBuf,
    pub(crate) module_path: PathBuf,
    pub(crate) blocks: Vec<BlockId>,
    pub(crate) calling_block: Option<BlockId>,
}

impl ModuleData {
    pub(crate) fn new(
        root_path: PathBuf,
        module_path: PathBuf,
        blocks: Vec<BlockId>,
        calling_block: Option<BlockId>,
    ) -> Self {
        Self {
            root_path,
            module_path,
            blocks,
            calling_block,
        }
    }
}

#[derive(Clone, Copy)]
pub struct Module<'a> {
    arena: &'a Arena,
    data: &'a ModuleData,
}

impl<'a> Module<'a> {
    pub(crate) fn new(arena: &'a Arena, data: &'a ModuleData) -> Self {
        Self { arena, data }
    }

    pub fn root_path(&self) -> &'a Path {
        &self.data.root_path
    }

    pub fn module_path(&self) -> &'a Path {
        &self.data.module_path
    }

    /// The `module` block that instantiated this module; `None` for the root.
    pub fn calling_block(&self) -> Option<Block<'a>> {
        self.data.calling_block.map(|id| self.arena.block(id))
    }

    pub fn blocks(&self) -> Vec<Block<'a>> {
        self.data
            .blocks
            .iter()
            .map(|id| self.arena.block(*id))
            .collect()
    }

    fn blocks_by_type(&self, kind: &BlockKind, label: &str) -> Vec<Block<'a>> {
        self.blocks()
            .into_iter()
            .filter(|b| b.kind() == kind && !b.labels().is_empty() && b.type_label() == label)
            .collect()
    }

    pub fn get_resources_by_type(&self, label: &str) -> Vec<Block<'a>> {
        self.blocks_by_type(&BlockKind::Resource, label)
    }

    pub fn get_datas_by_type(&self, label: &str) -> Vec<Block<'a>> {
        self.blocks_by_type(&BlockKind::Data, label)
    }

    /// Provider blocks for `name`. With an alias (`"west"` or `"aws.west"`)
    /// only blocks whose `alias` attribute matches are returned, without one
    /// only blocks that have no `alias`.
    pub fn get_provider_blocks_by_provider(&self, name: &str, alias: Option<&str>) -> Vec<Block<'a>> {
        let prefix = format!("{name}.");
        self.blocks_by_type(&BlockKind::Provider, name)
            .into_iter()
            .filter(|block| match alias {
                Some(alias) => {
                    let alias = alias.strip_prefix(&prefix).unwrap_or(alias);
                    block
                        .get_attribute("alias")
                        .is_some_and(|attr| attr.equals(alias, &[]))
                }
                None => block.missing_child("alias"),
            })
            .collect()
    }

    /// First block addressed by any reference in `attr`.
    pub fn get_referenced_block(&self, attr: &Attribute<'_>) -> Result<Block<'a>, ReferenceError> {
        let blocks = self.blocks();
        attr.all_references()
            .iter()
            .find_map(|reference| {
                blocks
                    .iter()
                    .find(|block| reference.refers_to(&block.reference()))
                    .copied()
            })
            .ok_or_else(|| ReferenceError::NoMatchingBlock(attr.name().to_string()))
    }

    /// Resources of type `label` whose `attr_name` references `target`, either
    /// directly or through an `each.*` value whose `for_each` references it.
    pub fn get_referencing_resources(
        &self,
        target: &Block<'_>,
        label: &str,
        attr_name: &str,
    ) -> Vec<Block<'a>> {
        self.get_resources_by_type(label)
            .into_iter()
            .filter(|block| {
                let Some(attr) = block.get_attribute(attr_name) else {
                    return false;
                };
                if attr.references_block(target) {
                    return true;
                }
                let via_each = attr
                    .all_references()
                    .iter()
                    .any(|reference| reference.type_label() == "each");
                via_each
                    && block
                        .get_attribute("for_each")
                        .is_some_and(|for_each| for_each.references_block(target))
            })
            .collect()
    }

    /// Module calls whose `source` equals `source`.
    pub fn get_modules_by_source(&self, source: &str) -> Vec<Block<'a>> {
        self.blocks()
            .into_iter()
            .filter(|block| *block.kind() == BlockKind::Module)
            .filter(|block| {
                block
                    .get_attribute("source")
                    .is_some_and(|attr| attr.equals(source, &[]))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::tests::arena_from;

    fn module(ids: Vec<BlockId>) -> ModuleData {
        ModuleData::new(PathBuf::from("/project"), PathBuf::from("/project"), ids, None)
    }

    const SOURCE: &str = r#"
provider "aws" {
  region = "eu-west-1"
}
provider "aws" {
  alias  = "west"
  region = "us-west-2"
}
resource "aws_instance" "web" {
  ami = "x"
}
resource "aws_eip" "ip" {
  instance = aws_instance.web.id
}
resource "aws_ebs_volume" "vol" {
  for_each = aws_instance.web.disks
  size     = each.value.size
}
data "aws_ami" "ubuntu" {}
module "net" {
  source = "./net"
}
"#;

    #[test]
    fn typed_lookups() {
        let (arena, ids) = arena_from(SOURCE);
        let data = module(ids);
        let m = Module::new(&arena, &data);
        assert_eq!(m.get_resources_by_type("aws_instance").len(), 1);
        assert_eq!(m.get_datas_by_type("aws_ami").len(), 1);
        assert!(m.get_resources_by_type("aws_ami").is_empty());
        assert_eq!(m.get_modules_by_source("./net").len(), 1);
        assert!(m.get_modules_by_source("./other").is_empty());
        assert!(m.calling_block().is_none());
    }

    #[test]
    fn provider_lookup_by_alias() {
        let (arena, ids) = arena_from(SOURCE);
        let data = module(ids);
        let m = Module::new(&arena, &data);

        let default = m.get_provider_blocks_by_provider("aws", None);
        assert_eq!(default.len(), 1);
        assert!(default[0].missing_child("alias"));

        let west = m.get_provider_blocks_by_provider("aws", Some("aws.west"));
        assert_eq!(west.len(), 1);
        assert_eq!(
            west[0].get_attribute("region").unwrap().value(),
            crate::value::Value::from("us-west-2")
        );
        assert_eq!(m.get_provider_blocks_by_provider("aws", Some("west")).len(), 1);
        assert!(m.get_provider_blocks_by_provider("aws", Some("east")).is_empty());
    }

    #[test]
    fn referenced_and_referencing_blocks() {
        let (arena, ids) = arena_from(SOURCE);
        let data = module(ids);
        let m = Module::new(&arena, &data);

        let web = m.get_resources_by_type("aws_instance")[0];
        let eip = m.get_resources_by_type("aws_eip")[0];
        let instance = eip.get_attribute("instance").unwrap();
        assert_eq!(m.get_referenced_block(&instance).unwrap(), web);

        let ami = web.get_attribute("ami").unwrap();
        assert_eq!(
            m.get_referenced_block(&ami),
            Err(ReferenceError::NoMatchingBlock("ami".into()))
        );

        assert_eq!(m.get_referencing_resources(&web, "aws_eip", "instance"), vec![eip]);
        let volumes = m.get_referencing_resources(&web, "aws_ebs_volume", "size");
        assert_eq!(volumes.len(), 1);
        assert!(m.get_referencing_resources(&eip, "aws_ebs_volume", "size").is_empty());
    }
}
