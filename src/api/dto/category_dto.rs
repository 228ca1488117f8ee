//! 施工类别 DTO
//!
//! BOQ 生成时可选的固定施工类别目录。

use serde::Serialize;
use serde::ser::Serializer;

/// 施工类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConstructionCategory {
    /// 显示名称
    pub name: &'static str,
    /// 识别关键词
    pub keywords: &'static [&'static str],
    /// 计量单位
    pub units: &'static [&'static str],
    /// 施工活动
    pub activities: &'static [&'static str],
}

/// 类别目录，按固定顺序序列化为 `{key: category}`
#[derive(Debug, Clone, Copy)]
pub struct CategoryCatalogue(pub &'static [(&'static str, ConstructionCategory)]);

impl CategoryCatalogue {
    pub fn get(&self, key: &str) -> Option<&ConstructionCategory> {
        self.0
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, category)| category)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for CategoryCatalogue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(key, category)| (*key, category)))
    }
}

pub const CONSTRUCTION_CATEGORIES: CategoryCatalogue = CategoryCatalogue(&[
    (
        "reinforcement",
        ConstructionCategory {
            name: "Steel Reinforcement",
            keywords: &["steel", "reinforcement", "rebar", "mesh", "bars", "stirrups", "ties"],
            units: &["kg", "ton", "m", "pieces"],
            activities: &[
                "steel reinforcement",
                "rebar installation",
                "mesh laying",
                "stirrup fabrication",
            ],
        },
    ),
    (
        "brick",
        ConstructionCategory {
            name: "Brickwork & Masonry",
            keywords: &["brick", "masonry", "block", "wall", "partition", "cladding"],
            units: &["m²", "m³", "pieces", "sq ft"],
            activities: &["brickwork", "blockwork", "masonry walls", "partition walls"],
        },
    ),
    (
        "plumbing",
        ConstructionCategory {
            name: "Plumbing Systems",
            keywords: &["plumbing", "pipe", "fixture", "drainage", "water", "sanitary", "valve"],
            units: &["m", "pieces", "sets", "nos"],
            activities: &[
                "plumbing installation",
                "pipe fitting",
                "fixture installation",
                "drainage systems",
            ],
        },
    ),
    (
        "electrical",
        ConstructionCategory {
            name: "Electrical Systems",
            keywords: &["electrical", "wiring", "conduit", "switch", "outlet", "lighting", "panel"],
            units: &["m", "points", "sets", "nos"],
            activities: &[
                "electrical wiring",
                "conduit installation",
                "fixture installation",
                "panel installation",
            ],
        },
    ),
    (
        "concrete",
        ConstructionCategory {
            name: "Concrete Work",
            keywords: &["concrete", "cement", "foundation", "slab", "beam", "column", "grade"],
            units: &["m³", "m²", "cum"],
            activities: &["concrete work", "foundation", "structural concrete", "finishing"],
        },
    ),
    (
        "finishing",
        ConstructionCategory {
            name: "Finishing Works",
            keywords: &["finishing", "paint", "tile", "flooring", "ceiling", "plaster", "render"],
            units: &["m²", "sq ft", "pieces"],
            activities: &["painting", "tiling", "flooring", "ceiling works", "plastering"],
        },
    ),
    (
        "earthwork",
        ConstructionCategory {
            name: "Earthwork & Excavation",
            keywords: &["excavation", "earthwork", "backfill", "compaction", "soil", "foundation"],
            units: &["m³", "cum", "sq m"],
            activities: &["excavation", "backfilling", "compaction", "site preparation"],
        },
    ),
    (
        "roofing",
        ConstructionCategory {
            name: "Roofing Systems",
            keywords: &["roof", "roofing", "waterproofing", "insulation", "gutter", "drainage"],
            units: &["m²", "sq ft", "pieces"],
            activities: &[
                "roofing installation",
                "waterproofing",
                "insulation",
                "gutter installation",
            ],
        },
    ),
]);
