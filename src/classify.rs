use std::str::FromStr;

use anyhow::{bail, ensure};
use serde::Serialize;

/// 检测大类：道路坑洞或垃圾
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectKind {
    Pothole,
    Waste,
}

impl DetectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pothole => "pothole",
            Self::Waste => "waste",
        }
    }
}

impl FromStr for DetectKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pothole" => Ok(Self::Pothole),
            "waste" => Ok(Self::Waste),
            _ => bail!("未知检测类别: {s}"),
        }
    }
}

/// 垃圾子类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WasteCategory {
    Glass,
    Metal,
    Paper,
    Plastic,
    Residual,
    Unknown,
}

impl WasteCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Glass => "Glass",
            Self::Metal => "Metal",
            Self::Paper => "Paper",
            Self::Plastic => "Plastic",
            Self::Residual => "Residual",
            Self::Unknown => "Unknown",
        }
    }
}

/// 由类别索引解析出的垃圾属性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WasteClass {
    pub category: WasteCategory,
    pub is_recyclable: bool,
    pub is_decomposable: bool,
}

/// 类别索引映射表，顺序必须和训练模型的标签顺序一致
///
/// 这是模型和服务之间的部署约定，改动模型标签时必须同步更新
const CLASS_TABLE: [(WasteCategory, bool, bool); 5] = [
    (WasteCategory::Glass, true, false),
    (WasteCategory::Metal, true, false),
    (WasteCategory::Paper, true, true),
    (WasteCategory::Plastic, true, false),
    (WasteCategory::Residual, false, false),
];

/// 把模型输出的类别索引映射为垃圾属性，越界索引一律归为 Unknown
pub fn resolve(class_id: i32) -> WasteClass {
    match usize::try_from(class_id).ok().and_then(|i| CLASS_TABLE.get(i)) {
        Some(&(category, is_recyclable, is_decomposable)) => {
            WasteClass { category, is_recyclable, is_decomposable }
        }
        None => WasteClass {
            category: WasteCategory::Unknown,
            is_recyclable: false,
            is_decomposable: false,
        },
    }
}

/// 校验部署侧的标签文件和映射表是否一致
///
/// 标签文件每行一个类别名，数量和顺序都必须匹配
pub fn validate_labels(labels: &[String]) -> anyhow::Result<()> {
    ensure!(
        labels.len() == CLASS_TABLE.len(),
        "标签数量不匹配: 模型 {} 个，映射表 {} 个",
        labels.len(),
        CLASS_TABLE.len()
    );
    for (i, label) in labels.iter().enumerate() {
        let expected = CLASS_TABLE[i].0.as_str();
        ensure!(
            label.trim().eq_ignore_ascii_case(expected),
            "标签顺序不匹配: 索引 {i} 处模型为 {label:?}，映射表为 {expected:?}"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, WasteCategory::Glass, true, false)]
    #[case(1, WasteCategory::Metal, true, false)]
    #[case(2, WasteCategory::Paper, true, true)]
    #[case(3, WasteCategory::Plastic, true, false)]
    #[case(4, WasteCategory::Residual, false, false)]
    #[case(5, WasteCategory::Unknown, false, false)]
    #[case(-1, WasteCategory::Unknown, false, false)]
    fn test_resolve(
        #[case] class_id: i32,
        #[case] category: WasteCategory,
        #[case] is_recyclable: bool,
        #[case] is_decomposable: bool,
    ) {
        let class = resolve(class_id);
        assert_eq!(class.category, category);
        assert_eq!(class.is_recyclable, is_recyclable);
        assert_eq!(class.is_decomposable, is_decomposable);
    }

    #[test]
    fn test_validate_labels() {
        let labels: Vec<String> =
            ["glass", "metal", "paper", "plastic", "residual"].map(String::from).into();
        assert!(validate_labels(&labels).is_ok());

        // 数量不匹配
        assert!(validate_labels(&labels[..4]).is_err());

        // 顺序不匹配
        let mut swapped = labels.clone();
        swapped.swap(0, 1);
        assert!(validate_labels(&swapped).is_err());
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("pothole".parse::<DetectKind>().unwrap(), DetectKind::Pothole);
        assert_eq!("waste".parse::<DetectKind>().unwrap(), DetectKind::Waste);
        assert!("garbage".parse::<DetectKind>().is_err());
    }
}
