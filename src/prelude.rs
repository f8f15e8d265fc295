pub(crate) use {
    std::{
        collections::HashSet,
        fmt,
        time::Duration,
    },
    chrono::{
        prelude::*,
        TimeDelta,
    },
    itertools::Itertools as _,
    rocket::{
        Request,
        State,
        http::Status,
        response::{
            Responder,
            content::RawText,
        },
        serde::json::Json,
    },
    serde::{
        Deserialize,
        Serialize,
    },
    sqlx::{
        PgPool,
        Postgres,
        Transaction,
    },
    uuid::Uuid,
    crate::{
        Environment,
        config::Config,
        http::StatusOrError,
        profile::{
            Admin,
            Profile,
        },
    },
};
