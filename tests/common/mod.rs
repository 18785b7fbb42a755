#![allow(dead_code)]

use chrono::{DateTime, Utc};
use filtercrate::filtering::create_joined_relation_filter;
use filtercrate::{
    ColumnDescriptor, ColumnRef, Condition, FilterDefinitions, Join, RenderOptions, SqlValueType,
    SubSelect,
};
use sea_orm::{
    ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, DbErr, Statement, Value,
};
use sea_orm_migration::prelude::*;

pub const ALICE: &str = "6f1c0a52-8d3e-4c1b-9a57-1b2f3c4d5e01";
pub const JOHN: &str = "6f1c0a52-8d3e-4c1b-9a57-1b2f3c4d5e02";
pub const BOB: &str = "6f1c0a52-8d3e-4c1b-9a57-1b2f3c4d5e03";
pub const CAROL: &str = "6f1c0a52-8d3e-4c1b-9a57-1b2f3c4d5e04";

pub const ORG_A: &str = "9b1deb4d-3b7d-4bad-9bdd-2b0d7b3dcb0a";
pub const ORG_B: &str = "9b1deb4d-3b7d-4bad-9bdd-2b0d7b3dcb0b";

pub const SCOUTS: &str = "0c9a7e3b-52d4-4f1e-8c6b-7d2e1f0a9b01";
pub const CHOIR: &str = "0c9a7e3b-52d4-4f1e-8c6b-7d2e1f0a9b02";

/// Permission guarding the `salary` key
pub const FINANCE: &str = "finance";

/// Filter keys exposed for members, with an `emails` and an `organization`
/// relation and a `settings.dog` namespace.
///
/// `org` and `orgMembership` filter the same organization through a `LEFT`
/// and an `INNER` join. `registrations` and `groups` are relations whose
/// sub-selects join `groups` themselves.
pub fn member_filters() -> FilterDefinitions {
    let emails = FilterDefinitions::builder("email_recipients")
        .column("email", ColumnDescriptor::column("email", SqlValueType::String))
        .column(
            "sentAt",
            ColumnDescriptor::column("sentAt", SqlValueType::Datetime).nullable(),
        )
        .build()
        .expect("valid email filters");

    let organizations = FilterDefinitions::builder("organizations")
        .column("id", ColumnDescriptor::column("id", SqlValueType::Uuid))
        .column("name", ColumnDescriptor::column("name", SqlValueType::String))
        .build()
        .expect("valid organization filters");

    let registrations = FilterDefinitions::builder("registrations")
        .column(
            "groupId",
            ColumnDescriptor::column("groupId", SqlValueType::Uuid).nullable(),
        )
        .column(
            "group",
            ColumnDescriptor::new(ColumnRef::table("groups", "name"), SqlValueType::String)
                .nullable(),
        )
        .build()
        .expect("valid registration filters");

    let groups = FilterDefinitions::builder("groups")
        .column(
            "id",
            ColumnDescriptor::new(ColumnRef::table("g", "id"), SqlValueType::Uuid),
        )
        .column(
            "name",
            ColumnDescriptor::new(ColumnRef::table("g", "name"), SqlValueType::String),
        )
        .build()
        .expect("valid group filters");

    let dog = FilterDefinitions::builder("member_dog")
        .column(
            "name",
            ColumnDescriptor::column("dogName", SqlValueType::String).nullable(),
        )
        .build()
        .expect("valid dog filters");
    let settings = FilterDefinitions::builder("member_settings")
        .namespace("dog", dog)
        .build()
        .expect("valid settings filters");

    FilterDefinitions::builder("members")
        .column("id", ColumnDescriptor::column("id", SqlValueType::Uuid))
        .column("name", ColumnDescriptor::column("name", SqlValueType::String))
        .column(
            "age",
            ColumnDescriptor::column("age", SqlValueType::Integer).nullable(),
        )
        .column(
            "active",
            ColumnDescriptor::column("active", SqlValueType::Boolean),
        )
        .column(
            "createdAt",
            ColumnDescriptor::column("createdAt", SqlValueType::Datetime),
        )
        .column(
            "organizationId",
            ColumnDescriptor::column("organizationId", SqlValueType::Uuid).nullable(),
        )
        .column(
            "memberNumber",
            ColumnDescriptor::column("memberNumber", SqlValueType::String).case_sensitive(),
        )
        .column(
            "salary",
            ColumnDescriptor::column("salary", SqlValueType::Integer)
                .nullable()
                .requires_permission(FINANCE),
        )
        .wildcard("customFields", |key| {
            matches!(key, "shirt" | "nickname").then(|| {
                ColumnDescriptor::column(format!("custom_{key}"), SqlValueType::String).nullable()
            })
        })
        .namespace("settings", settings)
        .relation(
            "emails",
            SubSelect::from_table("email_recipients")
                .and_where(Condition::eq(ColumnRef::new("objectId"), ColumnRef::parent("id"))),
            emails,
        )
        .relation(
            "organization",
            SubSelect::from_table("organizations").and_where(Condition::eq(
                ColumnRef::new("id"),
                ColumnRef::parent("organizationId"),
            )),
            organizations.clone(),
        )
        .joined(
            "org",
            Join::left(
                "organizations",
                Condition::eq(ColumnRef::new("id"), ColumnRef::parent("organizationId")),
            ),
            organizations.clone(),
        )
        .entry(
            "orgMembership",
            create_joined_relation_filter(
                Join::inner(
                    "organizations",
                    Condition::eq(ColumnRef::new("id"), ColumnRef::parent("organizationId")),
                )
                .alias("o"),
                organizations,
            )
            .may_be_missing(),
        )
        .relation(
            "registrations",
            SubSelect::from_table("registrations")
                .join(Join::left(
                    "groups",
                    Condition::eq(ColumnRef::table("groups", "id"), ColumnRef::new("groupId")),
                ))
                .and_where(Condition::eq(ColumnRef::new("memberId"), ColumnRef::parent("id"))),
            registrations,
        )
        .relation(
            "groups",
            SubSelect::from_table("registrations")
                .alias("r")
                .join(
                    Join::inner(
                        "groups",
                        Condition::eq(ColumnRef::table("g", "id"), ColumnRef::new("groupId")),
                    )
                    .alias("g"),
                )
                .and_where(Condition::eq(ColumnRef::new("memberId"), ColumnRef::parent("id"))),
            groups,
        )
        .build()
        .expect("valid member filters")
}

pub async fn setup_test_db() -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect("sqlite::memory:").await?;

    // Run migrations
    Migrator::up(&db, None).await?;
    seed(&db).await?;

    Ok(db)
}

/// Names of the members matching `condition`, sorted
pub async fn matching_names(
    db: &DatabaseConnection,
    condition: &Condition,
) -> Result<Vec<String>, DbErr> {
    let query = condition
        .render(&RenderOptions::new(DatabaseBackend::Sqlite, "members"))
        .map_err(|err| DbErr::Custom(err.to_string()))?;
    let rows = db
        .query_all(query.into_statement(r#"SELECT "members"."name" FROM "members""#))
        .await?;

    let mut names = rows
        .iter()
        .map(|row| row.try_get::<String>("", "name"))
        .collect::<Result<Vec<_>, _>>()?;
    names.sort();
    Ok(names)
}

fn date(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .expect("valid fixture date")
        .to_utc()
}

async fn insert(db: &DatabaseConnection, sql: &str, values: Vec<Value>) -> Result<(), DbErr> {
    db.execute(Statement::from_sql_and_values(
        DatabaseBackend::Sqlite,
        sql,
        values,
    ))
    .await?;
    Ok(())
}

async fn seed(db: &DatabaseConnection) -> Result<(), DbErr> {
    for (id, name) in [(ORG_A, "Org A"), (ORG_B, "Org B")] {
        insert(
            db,
            r#"INSERT INTO "organizations" ("id", "name") VALUES (?, ?)"#,
            vec![id.into(), name.into()],
        )
        .await?;
    }

    let members: [(&str, &str, Option<i64>, bool, &str, Option<&str>, Option<&str>); 4] = [
        (ALICE, "Alice Smith", Some(30), true, "2024-01-10T10:00:00Z", Some(ORG_A), Some("Rex")),
        (JOHN, "JOHN DOE", None, false, "2024-02-15T10:00:00Z", None, None),
        (BOB, "Bob Under_Score", Some(17), true, "2024-03-20T10:00:00Z", Some(ORG_B), Some("Max")),
        (CAROL, "Carol 50% Jones", Some(65), false, "2024-04-25T10:00:00Z", Some(ORG_A), None),
    ];
    for (id, name, age, active, created_at, organization, dog) in members {
        insert(
            db,
            r#"INSERT INTO "members" ("id", "name", "age", "active", "createdAt", "organizationId", "dogName") VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            vec![
                id.into(),
                name.into(),
                age.into(),
                active.into(),
                date(created_at).into(),
                organization.map(str::to_string).into(),
                dog.map(str::to_string).into(),
            ],
        )
        .await?;
    }

    let details: [(&str, &str, Option<i64>, Option<&str>, Option<&str>); 4] = [
        (ALICE, "AB-12", Some(5000), Some("L"), None),
        (JOHN, "ab-12", None, None, None),
        (BOB, "CD-34", None, Some("m"), None),
        (CAROL, "cd-99", Some(4000), None, Some("Caz")),
    ];
    for (id, number, salary, shirt, nickname) in details {
        insert(
            db,
            r#"UPDATE "members" SET "memberNumber" = ?, "salary" = ?, "custom_shirt" = ?, "custom_nickname" = ? WHERE "id" = ?"#,
            vec![
                number.into(),
                salary.into(),
                shirt.map(str::to_string).into(),
                nickname.map(str::to_string).into(),
                id.into(),
            ],
        )
        .await?;
    }

    for (id, name) in [(SCOUTS, "Scouts"), (CHOIR, "Choir")] {
        insert(
            db,
            r#"INSERT INTO "groups" ("id", "name") VALUES (?, ?)"#,
            vec![id.into(), name.into()],
        )
        .await?;
    }

    // Bob and Carol have a registration still waiting for a group
    let registrations = [
        (ALICE, Some(SCOUTS)),
        (BOB, Some(CHOIR)),
        (BOB, None),
        (CAROL, None),
    ];
    for (member, group) in registrations {
        insert(
            db,
            r#"INSERT INTO "registrations" ("memberId", "groupId") VALUES (?, ?)"#,
            vec![member.into(), group.map(str::to_string).into()],
        )
        .await?;
    }

    let emails = [
        (ALICE, "alice@example.com", Some("2024-02-01T08:00:00Z")),
        (ALICE, "alice.old@example.com", None),
        (JOHN, "john@example.com", None),
        (CAROL, "carol@example.com", Some("2024-05-01T08:00:00Z")),
    ];
    for (member, email, sent_at) in emails {
        insert(
            db,
            r#"INSERT INTO "email_recipients" ("objectId", "email", "sentAt") VALUES (?, ?, ?)"#,
            vec![member.into(), email.into(), sent_at.map(date).into()],
        )
        .await?;
    }

    Ok(())
}

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(CreateMemberTables)]
    }
}

pub struct CreateMemberTables;

#[async_trait::async_trait]
impl MigrationName for CreateMemberTables {
    fn name(&self) -> &'static str {
        "m20240101_000001_create_member_tables"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for CreateMemberTables {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Organizations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Organizations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Organizations::Name).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Members::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Members::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Members::Name).string().not_null())
                    .col(ColumnDef::new(Members::Age).integer().null())
                    .col(ColumnDef::new(Members::Active).boolean().not_null())
                    .col(
                        ColumnDef::new(Members::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Members::OrganizationId).uuid().null())
                    .col(ColumnDef::new(Members::DogName).string().null())
                    .col(ColumnDef::new(Members::MemberNumber).string().null())
                    .col(ColumnDef::new(Members::Salary).integer().null())
                    .col(ColumnDef::new(Members::CustomShirt).string().null())
                    .col(ColumnDef::new(Members::CustomNickname).string().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EmailRecipients::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EmailRecipients::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(EmailRecipients::ObjectId).uuid().not_null())
                    .col(ColumnDef::new(EmailRecipients::Email).string().not_null())
                    .col(
                        ColumnDef::new(EmailRecipients::SentAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Groups::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Groups::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Groups::Name).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Registrations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Registrations::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Registrations::MemberId).uuid().not_null())
                    .col(ColumnDef::new(Registrations::GroupId).uuid().null())
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Registrations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Groups::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EmailRecipients::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Members::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Organizations::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(Debug)]
pub enum Members {
    Table,
    Id,
    Name,
    Age,
    Active,
    CreatedAt,
    OrganizationId,
    DogName,
    MemberNumber,
    Salary,
    CustomShirt,
    CustomNickname,
}

impl Iden for Members {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(
            s,
            "{}",
            match self {
                Self::Table => "members",
                Self::Id => "id",
                Self::Name => "name",
                Self::Age => "age",
                Self::Active => "active",
                Self::CreatedAt => "createdAt",
                Self::OrganizationId => "organizationId",
                Self::DogName => "dogName",
                Self::MemberNumber => "memberNumber",
                Self::Salary => "salary",
                Self::CustomShirt => "custom_shirt",
                Self::CustomNickname => "custom_nickname",
            }
        )
        .unwrap();
    }
}

#[derive(Debug)]
pub enum EmailRecipients {
    Table,
    Id,
    ObjectId,
    Email,
    SentAt,
}

impl Iden for EmailRecipients {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(
            s,
            "{}",
            match self {
                Self::Table => "email_recipients",
                Self::Id => "id",
                Self::ObjectId => "objectId",
                Self::Email => "email",
                Self::SentAt => "sentAt",
            }
        )
        .unwrap();
    }
}

#[derive(Debug)]
pub enum Organizations {
    Table,
    Id,
    Name,
}

impl Iden for Organizations {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(
            s,
            "{}",
            match self {
                Self::Table => "organizations",
                Self::Id => "id",
                Self::Name => "name",
            }
        )
        .unwrap();
    }
}

#[derive(Debug)]
pub enum Groups {
    Table,
    Id,
    Name,
}

impl Iden for Groups {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(
            s,
            "{}",
            match self {
                Self::Table => "groups",
                Self::Id => "id",
                Self::Name => "name",
            }
        )
        .unwrap();
    }
}

#[derive(Debug)]
pub enum Registrations {
    Table,
    Id,
    MemberId,
    GroupId,
}

impl Iden for Registrations {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(
            s,
            "{}",
            match self {
                Self::Table => "registrations",
                Self::Id => "id",
                Self::MemberId => "memberId",
                Self::GroupId => "groupId",
            }
        )
        .unwrap();
    }
}
