//! Table definitions for the staging area and the star schema
//!
//! Tables are described as data (`TableDef`) and rendered to DDL per
//! dialect. Redshift receives distribution/sort keys and (informational)
//! foreign keys; DuckDB receives sequences in place of identity columns.

use super::Dialect;

/// Column data type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Variable length text; `None` means unbounded (`VARCHAR(MAX)`)
    Varchar(Option<u32>),
    /// Fixed length text
    Char(u32),
    /// Exact numeric with precision and scale
    Numeric(u8, u8),
    /// 32-bit integer
    Int,
    /// Double precision float
    Double,
    /// Timestamp without time zone
    Timestamp,
}

impl ColumnType {
    /// Render the type name for a dialect
    pub fn render(&self, dialect: Dialect) -> String {
        match (dialect, self) {
            (Dialect::Redshift, ColumnType::Varchar(None)) => "VARCHAR(MAX)".to_string(),
            (Dialect::Redshift, ColumnType::Varchar(Some(n))) => format!("VARCHAR({})", n),
            (Dialect::Redshift, ColumnType::Char(n)) => format!("CHAR({})", n),
            (Dialect::Redshift, ColumnType::Int) => "INT".to_string(),
            (Dialect::Redshift, ColumnType::Double) => "DOUBLE PRECISION".to_string(),
            (Dialect::Redshift, ColumnType::Numeric(p, s)) => format!("NUMERIC({},{})", p, s),
            (Dialect::DuckDb, ColumnType::Varchar(_) | ColumnType::Char(_)) => {
                "VARCHAR".to_string()
            }
            (Dialect::DuckDb, ColumnType::Int) => "INTEGER".to_string(),
            (Dialect::DuckDb, ColumnType::Double) => "DOUBLE".to_string(),
            (Dialect::DuckDb, ColumnType::Numeric(p, s)) => format!("DECIMAL({},{})", p, s),
            (_, ColumnType::Timestamp) => "TIMESTAMP".to_string(),
        }
    }

    /// Whether values of this type are stored as text
    pub fn is_text(&self) -> bool {
        matches!(self, ColumnType::Varchar(_) | ColumnType::Char(_))
    }
}

const VARCHAR_MAX: ColumnType = ColumnType::Varchar(None);

/// A column of a warehouse table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
    pub not_null: bool,
    pub primary_key: bool,
    pub unique: bool,
    /// Surrogate key generated by the warehouse
    pub identity: bool,
    /// Referenced table; the referenced column has the same name
    pub references: Option<Table>,
    pub dist_key: bool,
    pub sort_key: bool,
}

impl ColumnDef {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            not_null: false,
            primary_key: false,
            unique: false,
            identity: false,
            references: None,
            dist_key: false,
            sort_key: false,
        }
    }

    pub const fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    pub const fn references(mut self, table: Table) -> Self {
        self.references = Some(table);
        self
    }

    pub const fn dist_key(mut self) -> Self {
        self.dist_key = true;
        self
    }

    pub const fn sort_key(mut self) -> Self {
        self.sort_key = true;
        self
    }

    fn render(&self, table: Table, dialect: Dialect) -> String {
        let mut sql = format!("{} {}", self.name, self.ty.render(dialect));

        match dialect {
            Dialect::Redshift => {
                if self.identity {
                    sql.push_str(" IDENTITY(0,1)");
                }
                if self.dist_key {
                    sql.push_str(" DISTKEY");
                }
                if self.sort_key {
                    sql.push_str(" SORTKEY");
                }
            }
            Dialect::DuckDb => {
                if self.identity {
                    sql.push_str(&format!(
                        " DEFAULT nextval('{}')",
                        sequence_name(table, self.name)
                    ));
                }
            }
        }

        if self.not_null {
            sql.push_str(" NOT NULL");
        }
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        if self.unique {
            sql.push_str(" UNIQUE");
        }

        // DuckDB enforces foreign keys and refuses updates/drops on referenced
        // rows; Redshift only uses them as planner hints.
        if let (Dialect::Redshift, Some(target)) = (dialect, self.references) {
            sql.push_str(&format!(" REFERENCES {}({})", target.ident(), self.name));
        }

        sql
    }
}

/// Redshift distribution style
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistStyle {
    Even,
    All,
}

impl DistStyle {
    fn as_sql(&self) -> &'static str {
        match self {
            DistStyle::Even => "DISTSTYLE EVEN",
            DistStyle::All => "DISTSTYLE ALL",
        }
    }
}

/// Table definition
#[derive(Debug, Clone, Copy)]
pub struct TableDef {
    pub table: Table,
    pub columns: &'static [ColumnDef],
    pub dist_style: Option<DistStyle>,
}

impl TableDef {
    /// Column names in declaration order
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    /// Find a column by name (case-insensitive)
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Tables of the warehouse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    StagingEvents,
    StagingSongs,
    Time,
    Users,
    Artists,
    Songs,
    Songplays,
}

/// Order in which tables are created; referenced tables come first.
pub const CREATE_ORDER: [Table; 7] = [
    Table::StagingEvents,
    Table::StagingSongs,
    Table::Time,
    Table::Users,
    Table::Artists,
    Table::Songs,
    Table::Songplays,
];

/// Order in which tables are dropped; the fact table goes first.
pub const DROP_ORDER: [Table; 7] = [
    Table::Songplays,
    Table::StagingEvents,
    Table::StagingSongs,
    Table::Users,
    Table::Songs,
    Table::Artists,
    Table::Time,
];

impl Table {
    /// Table name
    pub fn name(&self) -> &'static str {
        match self {
            Table::StagingEvents => "staging_events",
            Table::StagingSongs => "staging_songs",
            Table::Time => "time",
            Table::Users => "users",
            Table::Artists => "artists",
            Table::Songs => "songs",
            Table::Songplays => "songplays",
        }
    }

    /// Table name as an SQL identifier
    ///
    /// `time` is a type keyword in both dialects and is always quoted.
    pub fn ident(&self) -> String {
        match self {
            Table::Time => "\"time\"".to_string(),
            other => other.name().to_string(),
        }
    }

    /// Whether the table is a staging (landing) table
    pub fn is_staging(&self) -> bool {
        matches!(self, Table::StagingEvents | Table::StagingSongs)
    }

    /// Static definition of the table
    pub fn definition(&self) -> &'static TableDef {
        match self {
            Table::StagingEvents => &STAGING_EVENTS,
            Table::StagingSongs => &STAGING_SONGS,
            Table::Time => &TIME,
            Table::Users => &USERS,
            Table::Artists => &ARTISTS,
            Table::Songs => &SONGS,
            Table::Songplays => &SONGPLAYS,
        }
    }

    /// Tables this table holds foreign keys to
    pub fn references(&self) -> Vec<Table> {
        let mut refs: Vec<Table> = Vec::new();
        for column in self.definition().columns {
            if let Some(target) = column.references
                && !refs.contains(&target)
            {
                refs.push(target);
            }
        }
        refs
    }

    /// Statements creating the table (and its sequences, for DuckDB)
    pub fn create_sql(&self, dialect: Dialect) -> Vec<String> {
        let def = self.definition();
        let mut statements = Vec::new();

        if dialect == Dialect::DuckDb {
            for column in def.columns.iter().filter(|c| c.identity) {
                statements.push(format!(
                    "CREATE SEQUENCE IF NOT EXISTS {} START 1",
                    sequence_name(*self, column.name)
                ));
            }
        }

        let columns: Vec<String> = def
            .columns
            .iter()
            .map(|c| format!("    {}", c.render(*self, dialect)))
            .collect();

        let mut create = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            self.ident(),
            columns.join(",\n")
        );
        if let (Dialect::Redshift, Some(style)) = (dialect, def.dist_style) {
            create.push('\n');
            create.push_str(style.as_sql());
        }
        statements.push(create);

        statements
    }

    /// Statements dropping the table (and its sequences, for DuckDB)
    pub fn drop_sql(&self, dialect: Dialect) -> Vec<String> {
        let mut statements = vec![format!("DROP TABLE IF EXISTS {}", self.ident())];

        if dialect == Dialect::DuckDb {
            for column in self.definition().columns.iter().filter(|c| c.identity) {
                statements.push(format!(
                    "DROP SEQUENCE IF EXISTS {}",
                    sequence_name(*self, column.name)
                ));
            }
        }

        statements
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn sequence_name(table: Table, column: &str) -> String {
    format!("{}_{}_seq", table.name(), column)
}

/// Ordered list of all create statements
pub fn create_table_queries(dialect: Dialect) -> Vec<String> {
    CREATE_ORDER
        .iter()
        .flat_map(|t| t.create_sql(dialect))
        .collect()
}

/// Ordered list of all drop statements
pub fn drop_table_queries(dialect: Dialect) -> Vec<String> {
    DROP_ORDER.iter().flat_map(|t| t.drop_sql(dialect)).collect()
}

// Example source row:
// {"artist":null,"auth":"Logged In","firstName":"Walter","gender":"M","itemInSession":0,
//  "lastName":"Frye","length":null,"level":"free","location":"San Francisco-Oakland-Hayward, CA",
//  "method":"GET","page":"Home","registration":1540919166796.0,"sessionId":38,"song":null,
//  "status":200,"ts":1541105830796,"userAgent":"Mozilla/5.0 ...","userId":"39"}
static STAGING_EVENTS: TableDef = TableDef {
    table: Table::StagingEvents,
    columns: &[
        ColumnDef::new("artist", VARCHAR_MAX),
        ColumnDef::new("auth", VARCHAR_MAX),
        ColumnDef::new("firstName", VARCHAR_MAX),
        ColumnDef::new("gender", ColumnType::Char(1)),
        ColumnDef::new("itemInSession", ColumnType::Numeric(4, 0)),
        ColumnDef::new("lastName", VARCHAR_MAX),
        ColumnDef::new("length", VARCHAR_MAX),
        ColumnDef::new("level", VARCHAR_MAX),
        ColumnDef::new("location", VARCHAR_MAX),
        ColumnDef::new("method", VARCHAR_MAX),
        ColumnDef::new("page", VARCHAR_MAX),
        ColumnDef::new("registration", ColumnType::Double),
        ColumnDef::new("sessionId", ColumnType::Numeric(20, 0)),
        ColumnDef::new("song", VARCHAR_MAX),
        ColumnDef::new("status", ColumnType::Numeric(4, 0)),
        ColumnDef::new("ts", ColumnType::Numeric(20, 0)),
        ColumnDef::new("userAgent", VARCHAR_MAX),
        ColumnDef::new("userId", VARCHAR_MAX),
    ],
    dist_style: None,
};

// Example source row:
// {"num_songs": 1, "artist_id": "ARJIE2Y1187B994AB7", "artist_latitude": null,
//  "artist_longitude": null, "artist_location": "", "artist_name": "Line Renaud",
//  "song_id": "SOUPIRU12A6D4FA1E1", "title": "Der Kleine Dompfaff", "duration": 152.92036, "year": 0}
static STAGING_SONGS: TableDef = TableDef {
    table: Table::StagingSongs,
    columns: &[
        ColumnDef::new("song_id", VARCHAR_MAX),
        ColumnDef::new("num_songs", VARCHAR_MAX),
        ColumnDef::new("title", VARCHAR_MAX),
        ColumnDef::new("artist_id", VARCHAR_MAX),
        ColumnDef::new("artist_latitude", VARCHAR_MAX),
        ColumnDef::new("artist_longitude", VARCHAR_MAX),
        ColumnDef::new("artist_location", VARCHAR_MAX),
        ColumnDef::new("artist_name", VARCHAR_MAX),
        ColumnDef::new("duration", ColumnType::Double),
        ColumnDef::new("year", ColumnType::Numeric(4, 0)),
    ],
    dist_style: None,
};

static TIME: TableDef = TableDef {
    table: Table::Time,
    columns: &[
        ColumnDef::new("start_time", ColumnType::Timestamp)
            .not_null()
            .primary_key()
            .sort_key(),
        ColumnDef::new("hour", ColumnType::Numeric(2, 0)).not_null(),
        ColumnDef::new("day", ColumnType::Numeric(2, 0)).not_null(),
        ColumnDef::new("week", ColumnType::Numeric(2, 0)).not_null(),
        ColumnDef::new("month", ColumnType::Numeric(2, 0)).not_null(),
        ColumnDef::new("year", ColumnType::Numeric(4, 0)).not_null(),
        ColumnDef::new("weekday", ColumnType::Varchar(Some(20))).not_null(),
    ],
    dist_style: Some(DistStyle::All),
};

static USERS: TableDef = TableDef {
    table: Table::Users,
    columns: &[
        ColumnDef::new("user_key", ColumnType::Int)
            .identity()
            .not_null()
            .primary_key()
            .sort_key(),
        ColumnDef::new("user_id", ColumnType::Varchar(Some(20)))
            .not_null()
            .unique(),
        ColumnDef::new("first_name", ColumnType::Varchar(Some(60))),
        ColumnDef::new("last_name", ColumnType::Varchar(Some(60))),
        ColumnDef::new("level", ColumnType::Varchar(Some(12))),
        ColumnDef::new("gender", ColumnType::Char(1)),
    ],
    dist_style: Some(DistStyle::Even),
};

static ARTISTS: TableDef = TableDef {
    table: Table::Artists,
    columns: &[
        ColumnDef::new("artist_key", ColumnType::Int)
            .identity()
            .not_null()
            .primary_key()
            .sort_key(),
        ColumnDef::new("artist_id", ColumnType::Varchar(Some(20)))
            .not_null()
            .unique(),
        ColumnDef::new("name", ColumnType::Varchar(Some(250))).not_null(),
        ColumnDef::new("location", VARCHAR_MAX),
        ColumnDef::new("latitude", ColumnType::Double),
        ColumnDef::new("longitude", ColumnType::Double),
    ],
    dist_style: Some(DistStyle::All),
};

static SONGS: TableDef = TableDef {
    table: Table::Songs,
    columns: &[
        ColumnDef::new("song_key", ColumnType::Int)
            .identity()
            .primary_key()
            .dist_key()
            .sort_key(),
        ColumnDef::new("song_id", ColumnType::Varchar(Some(20))).unique(),
        ColumnDef::new("num_songs", ColumnType::Numeric(3, 0)).not_null(),
        ColumnDef::new("title", ColumnType::Varchar(Some(250))).not_null(),
        ColumnDef::new("artist_key", ColumnType::Int)
            .not_null()
            .references(Table::Artists),
        ColumnDef::new("year", ColumnType::Numeric(4, 0)).not_null(),
        ColumnDef::new("duration", ColumnType::Double),
    ],
    dist_style: None,
};

static SONGPLAYS: TableDef = TableDef {
    table: Table::Songplays,
    columns: &[
        ColumnDef::new("songplay_key", ColumnType::Int)
            .identity()
            .not_null()
            .primary_key(),
        ColumnDef::new("start_time", ColumnType::Timestamp)
            .not_null()
            .references(Table::Time),
        ColumnDef::new("user_key", ColumnType::Int).references(Table::Users),
        ColumnDef::new("song_key", ColumnType::Int)
            .references(Table::Songs)
            .dist_key()
            .sort_key(),
        ColumnDef::new("artist_key", ColumnType::Int).references(Table::Artists),
        ColumnDef::new("session_id", ColumnType::Double).not_null(),
        ColumnDef::new("location", ColumnType::Varchar(Some(60))),
        ColumnDef::new("level", ColumnType::Varchar(Some(12))),
        ColumnDef::new("user_agent", VARCHAR_MAX).not_null(),
    ],
    dist_style: None,
};
