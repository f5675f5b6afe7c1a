use super::{BUILD_NUMBER, CLIENT_VERSION, EditorKind, ItemCatalog, MAJOR_VERSION, MINOR_VERSION};
use crate::error::Result;
use crate::types::TypeId;
use serde::{Deserialize, Serialize};

/// Human readable companion of the binary catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogManifest {
    pub major_version: u32,
    pub minor_version: u32,
    pub build_number: u32,
    /// Where the object specifications came from
    pub source: String,
    pub client_version: String,
    pub item_count: usize,
    /// Items the editor lists (named items other than id 0)
    pub items: Vec<ManifestItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestItem {
    pub id: TypeId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub article: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub kind: Option<EditorKind>,
}

impl CatalogManifest {
    pub(super) fn new(catalog: &ItemCatalog, source: String) -> Self {
        let items = catalog
            .items()
            .filter(|item| item.type_id != TypeId(0) && !item.name.is_empty())
            .map(|item| {
                let (article, name) = item.article();
                ManifestItem {
                    id: item.type_id,
                    name: name.to_string(),
                    article: article.map(str::to_string),
                    kind: item.kind,
                }
            })
            .collect();

        Self {
            major_version: MAJOR_VERSION,
            minor_version: MINOR_VERSION,
            build_number: BUILD_NUMBER,
            source,
            client_version: CLIENT_VERSION.to_string(),
            item_count: catalog.len(),
            items,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use crate::catalog::{ItemCatalog, ObjectSpec};
    use crate::types::TypeId;
    use claims::assert_ok;

    #[test]
    fn manifest_json() {
        let catalog = assert_ok!(ItemCatalog::generate(&[
            ObjectSpec::new(TypeId(0), ""),
            ObjectSpec::new(TypeId(100), "grass").with_flag("Bank"),
            ObjectSpec::new(TypeId(2853), "a bag").with_flag("Container"),
        ]));
        let manifest = catalog.manifest("objects.srv");
        let json = assert_ok!(manifest.to_json());

        insta::assert_snapshot!(json, @r#"
        {
          "major_version": 1,
          "minor_version": 100,
          "build_number": 1,
          "source": "objects.srv",
          "client_version": "7.70-cipsoft",
          "item_count": 3,
          "items": [
            {
              "id": 100,
              "name": "grass"
            },
            {
              "id": 2853,
              "name": "bag",
              "article": "a",
              "kind": "container"
            }
          ]
        }
        "#);

        assert_eq!(assert_ok!(super::CatalogManifest::from_json(&json)), manifest);
    }
}
