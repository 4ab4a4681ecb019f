//! 胸部解剖约定: 区域 (region) 与类型 (type) 的编码和名称.
//!
//! 标签图中每个体素的值按 `(type << 8) | region` 编码,
//! 即低 8 位为区域, 高 8 位为类型.

macro_rules! chest_enum {
    (
        $(#[$meta: meta])*
        $name: ident, $undefined: ident, $undefined_name: literal;
        $($(#[$vmeta: meta])* $variant: ident = $code: literal),* $(,)?
    ) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub enum $name {
            /// 未定义. 未知的名称或编码都会落到这里.
            #[default]
            $undefined,
            $($(#[$vmeta])* $variant,)*
        }

        impl $name {
            /// 全部取值, 按编码升序排列.
            pub const ALL: &'static [$name] = &[$name::$undefined, $($name::$variant),*];

            /// 数值编码.
            #[inline]
            pub const fn code(self) -> u8 {
                match self {
                    $name::$undefined => 0,
                    $($name::$variant => $code,)*
                }
            }

            /// 规范名称, 例如特征表中 `ChestRegion` / `ChestType` 列的取值.
            #[inline]
            pub const fn name(self) -> &'static str {
                match self {
                    $name::$undefined => $undefined_name,
                    $($name::$variant => stringify!($variant),)*
                }
            }

            /// 由数值编码获取. 未知编码映射为未定义值.
            pub fn from_code(code: u8) -> Self {
                match code {
                    $($code => $name::$variant,)*
                    _ => $name::$undefined,
                }
            }

            /// 由规范名称获取. 未知名称映射为未定义值.
            pub fn from_name(name: &str) -> Self {
                match name.trim() {
                    $(stringify!($variant) => $name::$variant,)*
                    _ => $name::$undefined,
                }
            }

            /// 是否为未定义值.
            #[inline]
            pub fn is_undefined(self) -> bool {
                matches!(self, $name::$undefined)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

chest_enum! {
    /// 胸部解剖区域.
    ChestRegion, UndefinedRegion, "UndefinedRegion";
    /// 全肺.
    WholeLung = 1,
    /// 右肺.
    RightLung = 2,
    /// 左肺.
    LeftLung = 3,
    /// 右上叶.
    RightSuperiorLobe = 4,
    /// 右中叶.
    RightMiddleLobe = 5,
    /// 右下叶.
    RightInferiorLobe = 6,
    /// 左上叶.
    LeftSuperiorLobe = 7,
    /// 左下叶.
    LeftInferiorLobe = 8,
    /// 左肺上三分之一.
    LeftUpperThird = 9,
    /// 左肺中三分之一.
    LeftMiddleThird = 10,
    /// 左肺下三分之一.
    LeftLowerThird = 11,
    /// 右肺上三分之一.
    RightUpperThird = 12,
    /// 右肺中三分之一.
    RightMiddleThird = 13,
    /// 右肺下三分之一.
    RightLowerThird = 14,
}

chest_enum! {
    /// 胸部组织类型.
    ChestType, UndefinedType, "UndefinedType";
    /// 正常肺实质.
    NormalParenchyma = 1,
    /// 气道.
    Airway = 2,
    /// 血管.
    Vessel = 3,
    /// 肺气肿.
    Emphysematous = 4,
    /// 磨玻璃影.
    GroundGlass = 5,
    /// 网状影.
    Reticular = 6,
    /// 结节.
    Nodular = 7,
    /// 斜裂.
    ObliqueFissure = 8,
    /// 水平裂.
    HorizontalFissure = 9,
}

/// 将 (区域, 类型) 编码为标签图体素值.
#[inline]
pub const fn encode_label(region: ChestRegion, ty: ChestType) -> u16 {
    ((ty.code() as u16) << 8) | region.code() as u16
}

/// 从标签图体素值中解码区域.
#[inline]
pub fn region_of(label: u16) -> ChestRegion {
    ChestRegion::from_code((label & 0x00ff) as u8)
}

/// 从标签图体素值中解码类型.
#[inline]
pub fn type_of(label: u16) -> ChestType {
    ChestType::from_code((label >> 8) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_encoding() {
        let v = encode_label(ChestRegion::LeftLung, ChestType::Vessel);
        assert_eq!(v, 0x0303);
        assert_eq!(region_of(v), ChestRegion::LeftLung);
        assert_eq!(type_of(v), ChestType::Vessel);

        assert_eq!(region_of(1), ChestRegion::WholeLung);
        assert_eq!(type_of(1), ChestType::UndefinedType);
    }

    #[test]
    fn test_unknown_maps_to_undefined() {
        assert_eq!(ChestRegion::from_code(200), ChestRegion::UndefinedRegion);
        assert_eq!(ChestType::from_code(99), ChestType::UndefinedType);
        assert_eq!(ChestRegion::from_name("Spleen"), ChestRegion::UndefinedRegion);
        assert_eq!(ChestType::from_name(""), ChestType::UndefinedType);
        assert_eq!(ChestRegion::from_name("WholeLung"), ChestRegion::WholeLung);
    }

    #[test]
    fn test_names_round_trip() {
        for r in ChestRegion::ALL {
            assert_eq!(ChestRegion::from_name(r.name()), *r);
            assert_eq!(ChestRegion::from_code(r.code()), *r);
        }
        for t in ChestType::ALL {
            assert_eq!(ChestType::from_name(t.name()), *t);
        }
        assert_eq!(ChestRegion::UndefinedRegion.to_string(), "UndefinedRegion");
    }
}
