use crate::model::ElementKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Double,
    Text,
}

impl FieldType {
    pub fn type_name(self) -> &'static str {
        match self {
            FieldType::Int => "integer",
            FieldType::Double => "double",
            FieldType::Text => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
}

impl Field {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
        }
    }
}

/// 属性スキーマ。名前の検索は大文字小文字を区別しない
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    fields: Vec<Field>,
}

impl Fields {
    /// 種別ごとの属性一覧
    pub fn for_kind(kind: ElementKind) -> Self {
        use FieldType::*;
        let spec: &[(&str, FieldType)] = match kind {
            ElementKind::Direction => &[
                ("dmcode", Int),
                ("zukei", Int),
                ("kandan", Int),
                ("teni", Int),
                ("vangle", Double),
            ],
            ElementKind::Note => &[
                ("dmcode", Int),
                ("teni", Int),
                ("vangle", Double),
                ("tateyoko", Int),
                ("size", Int),
                ("vtext", Text),
            ],
            _ => &[
                ("dmcode", Int),
                ("zukei", Int),
                ("kandan", Int),
                ("teni", Int),
            ],
        };
        Self {
            fields: spec
                .iter()
                .map(|&(name, field_type)| Field::new(name, field_type))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }
}
