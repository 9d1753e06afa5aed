//! Geographic data scope of an authenticated user
//!
//! Every scoped query embeds one of the clauses below and binds the scope with
//! [`bind_scope!`]. The clauses take the same four parameters in the same
//! order, so a query can combine them freely as long as it binds once per
//! clause.

use aedpics_common::roles::ScopeLevel;
use aedpics_common::UserRole;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    national: bool,
    region_code: Option<String>,
    city_code: Option<String>,
}

impl Scope {
    pub fn national() -> Self {
        Self {
            national: true,
            region_code: None,
            city_code: None,
        }
    }

    /// Scope that matches nothing
    pub fn none() -> Self {
        Self {
            national: false,
            region_code: None,
            city_code: None,
        }
    }

    /// Scope for a role working in an organization located at region/city
    ///
    /// A regional role without an organization region sees nothing, and so
    /// does a local role without both region and city.
    pub fn for_role(role: UserRole, region_code: Option<&str>, city_code: Option<&str>) -> Self {
        match role.scope_level() {
            ScopeLevel::National => Self::national(),
            ScopeLevel::Regional => match region_code {
                Some(region) => Self {
                    national: false,
                    region_code: Some(region.to_string()),
                    city_code: None,
                },
                None => Self::none(),
            },
            ScopeLevel::Local => match (region_code, city_code) {
                (Some(region), Some(city)) => Self {
                    national: false,
                    region_code: Some(region.to_string()),
                    city_code: Some(city.to_string()),
                },
                _ => Self::none(),
            },
            ScopeLevel::None => Self::none(),
        }
    }

    pub fn is_national(&self) -> bool {
        self.national
    }

    pub fn region_code(&self) -> Option<&str> {
        self.region_code.as_deref()
    }

    pub fn city_code(&self) -> Option<&str> {
        self.city_code.as_deref()
    }

    /// In-memory check matching [`device_clause`]
    pub fn contains(&self, region_code: &str, city_code: Option<&str>) -> bool {
        if self.national {
            return true;
        }
        match (&self.region_code, &self.city_code) {
            (Some(region), None) => region == region_code,
            (Some(region), Some(city)) => region == region_code && city_code == Some(city.as_str()),
            (None, _) => false,
        }
    }
}

/// Filter over an `aed_data` row aliased as `alias`
pub fn device_clause(alias: &str) -> String {
    format!(
        "(? = 1 OR ({a}.region_code = ? AND (? IS NULL OR {a}.city_code = ?)))",
        a = alias
    )
}

/// Filter over any row carrying an equipment serial column
///
/// The row is in scope when some device with that serial is.
pub fn serial_clause(serial_column: &str) -> String {
    format!(
        "(? = 1 OR EXISTS (SELECT 1 FROM aed_data sd WHERE sd.equipment_serial = {col} \
         AND sd.region_code = ? AND (? IS NULL OR sd.city_code = ?)))",
        col = serial_column
    )
}

/// Filter over a row with region/city columns (target lists)
pub fn region_clause(region_column: &str, city_column: &str) -> String {
    format!(
        "(? = 1 OR ({r} = ? AND (? IS NULL OR {c} = ?)))",
        r = region_column,
        c = city_column
    )
}

/// Bind the four scope parameters expected by the clauses above
#[macro_export]
macro_rules! bind_scope {
    ($query:expr, $scope:expr) => {
        $query
            .bind($scope.is_national())
            .bind($scope.region_code().map(str::to_string))
            .bind($scope.city_code().map(str::to_string))
            .bind($scope.city_code().map(str::to_string))
    };
}
