//! The index definition: a custom `legal_analyzer` (lowercase, English stop
//! and stem, domain synonyms) over the long-text fields, keyword fields for
//! enums and identifiers, and nested types for the per-entity collections so
//! queries against one party never cross-match another.

use serde_json::{json, Value};

/// Domain synonym groups expanded at analysis time.
pub const LEGAL_SYNONYMS: &[&str] = &[
    "motion,petition",
    "defendant,accused,respondent",
    "suppress,exclude,prohibit",
    "attorney,counsel,lawyer",
    "judgment,decree",
    "plaintiff,petitioner,complainant",
];

/// The full create-index body: settings (1 shard, 0 replicas by default) plus
/// mappings.
pub fn index_definition() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 0,
            "analysis": {
                "filter": {
                    "english_stop": { "type": "stop", "stopwords": "_english_" },
                    "english_stemmer": { "type": "stemmer", "language": "english" },
                    "legal_synonyms": { "type": "synonym", "synonyms": LEGAL_SYNONYMS }
                },
                "analyzer": {
                    "legal_analyzer": {
                        "type": "custom",
                        "tokenizer": "standard",
                        "filter": ["lowercase", "english_stop", "english_stemmer", "legal_synonyms"]
                    }
                }
            }
        },
        "mappings": {
            "properties": {
                "id": { "type": "keyword" },
                "file_name": {
                    "type": "text",
                    "fields": { "keyword": { "type": "keyword", "ignore_above": 512 } }
                },
                "content_type": { "type": "keyword" },
                "size": { "type": "long" },
                "content_hash": { "type": "keyword" },
                "text": { "type": "text", "analyzer": "legal_analyzer" },
                "storage_key": { "type": "keyword" },
                "public_url": { "type": "keyword", "index": false },
                "created_at": { "type": "date" },
                "updated_at": { "type": "date" },
                "metadata": {
                    "properties": {
                        "document_name": {
                            "type": "text",
                            "fields": { "keyword": { "type": "keyword", "ignore_above": 512 } }
                        },
                        "subject": {
                            "type": "text",
                            "analyzer": "legal_analyzer",
                            "fields": { "keyword": { "type": "keyword", "ignore_above": 512 } }
                        },
                        "summary": { "type": "text", "analyzer": "legal_analyzer" },
                        "document_type": { "type": "keyword" },
                        "category": { "type": "keyword" },
                        "status": { "type": "keyword" },
                        "language": { "type": "keyword" },
                        "pages": { "type": "integer" },
                        "word_count": { "type": "long" },
                        "legal_tags": { "type": "keyword" },
                        "ai_classified": { "type": "boolean" },
                        "confidence": { "type": "float" },
                        // Flattened projections of the nested case/court/judge
                        // entities, for filtering and sorting.
                        "case_name": {
                            "type": "text",
                            "analyzer": "legal_analyzer",
                            "fields": { "keyword": { "type": "keyword", "ignore_above": 512 } }
                        },
                        "case_number": { "type": "keyword" },
                        "court_name": {
                            "type": "text",
                            "fields": { "keyword": { "type": "keyword", "ignore_above": 512 } }
                        },
                        "judge_name": {
                            "type": "text",
                            "fields": { "keyword": { "type": "keyword", "ignore_above": 512 } }
                        },
                        "author": {
                            "type": "text",
                            "fields": { "keyword": { "type": "keyword", "ignore_above": 512 } }
                        },
                        "case": {
                            "properties": {
                                "number": { "type": "keyword" },
                                "name": { "type": "text", "analyzer": "legal_analyzer" },
                                "case_type": { "type": "keyword" },
                                "chapter": { "type": "keyword" },
                                "docket": { "type": "keyword" },
                                "nature_of_suit": { "type": "keyword" }
                            }
                        },
                        "court": {
                            "properties": {
                                "id": { "type": "keyword" },
                                "name": { "type": "text" },
                                "jurisdiction": { "type": "keyword" },
                                "level": { "type": "keyword" },
                                "district": { "type": "keyword" },
                                "division": { "type": "keyword" },
                                "county": { "type": "keyword" }
                            }
                        },
                        "judge": {
                            "properties": {
                                "name": { "type": "text" },
                                "title": { "type": "keyword" },
                                "id": { "type": "keyword" }
                            }
                        },
                        "parties": {
                            "type": "nested",
                            "properties": {
                                "name": {
                                    "type": "text",
                                    "fields": { "keyword": { "type": "keyword", "ignore_above": 512 } }
                                },
                                "role": { "type": "keyword" },
                                "party_type": { "type": "keyword" },
                                "date": { "type": "date" }
                            }
                        },
                        "attorneys": {
                            "type": "nested",
                            "properties": {
                                "name": {
                                    "type": "text",
                                    "fields": { "keyword": { "type": "keyword", "ignore_above": 512 } }
                                },
                                "bar_number": { "type": "keyword" },
                                "role": { "type": "keyword" },
                                "organization": { "type": "text" }
                            }
                        },
                        "charges": {
                            "type": "nested",
                            "properties": {
                                "statute": { "type": "keyword" },
                                "description": { "type": "text", "analyzer": "legal_analyzer" },
                                "grade": { "type": "keyword" },
                                "class": { "type": "keyword" },
                                "count": { "type": "integer" }
                            }
                        },
                        "authorities": {
                            "type": "nested",
                            "properties": {
                                "citation": { "type": "keyword" },
                                "case_title": { "type": "text" },
                                "authority_type": { "type": "keyword" },
                                "precedent": { "type": "boolean" },
                                "page": { "type": "keyword" }
                            }
                        },
                        "filing_date": { "type": "date" },
                        "event_date": { "type": "date" },
                        "hearing_date": { "type": "date" },
                        "decision_date": { "type": "date" },
                        "served_date": { "type": "date" },
                        "processed_at": { "type": "date" },
                        "timestamp": { "type": "date" }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn definition_pins_shards_and_the_legal_analyzer() {
        let definition = index_definition();
        assert_eq!(definition["settings"]["number_of_shards"], 1);
        assert_eq!(definition["settings"]["number_of_replicas"], 0);

        let filters = &definition["settings"]["analysis"]["analyzer"]["legal_analyzer"]["filter"];
        assert_eq!(
            filters,
            &json!(["lowercase", "english_stop", "english_stemmer", "legal_synonyms"])
        );
    }

    #[test]
    fn definition_snapshot() {
        insta::assert_json_snapshot!(index_definition(), @r###"
        {
          "mappings": {
            "properties": {
              "content_hash": {
                "type": "keyword"
              },
              "content_type": {
                "type": "keyword"
              },
              "created_at": {
                "type": "date"
              },
              "file_name": {
                "fields": {
                  "keyword": {
                    "ignore_above": 512,
                    "type": "keyword"
                  }
                },
                "type": "text"
              },
              "id": {
                "type": "keyword"
              },
              "metadata": {
                "properties": {
                  "ai_classified": {
                    "type": "boolean"
                  },
                  "attorneys": {
                    "properties": {
                      "bar_number": {
                        "type": "keyword"
                      },
                      "name": {
                        "fields": {
                          "keyword": {
                            "ignore_above": 512,
                            "type": "keyword"
                          }
                        },
                        "type": "text"
                      },
                      "organization": {
                        "type": "text"
                      },
                      "role": {
                        "type": "keyword"
                      }
                    },
                    "type": "nested"
                  },
                  "author": {
                    "fields": {
                      "keyword": {
                        "ignore_above": 512,
                        "type": "keyword"
                      }
                    },
                    "type": "text"
                  },
                  "authorities": {
                    "properties": {
                      "authority_type": {
                        "type": "keyword"
                      },
                      "case_title": {
                        "type": "text"
                      },
                      "citation": {
                        "type": "keyword"
                      },
                      "page": {
                        "type": "keyword"
                      },
                      "precedent": {
                        "type": "boolean"
                      }
                    },
                    "type": "nested"
                  },
                  "case": {
                    "properties": {
                      "case_type": {
                        "type": "keyword"
                      },
                      "chapter": {
                        "type": "keyword"
                      },
                      "docket": {
                        "type": "keyword"
                      },
                      "name": {
                        "analyzer": "legal_analyzer",
                        "type": "text"
                      },
                      "nature_of_suit": {
                        "type": "keyword"
                      },
                      "number": {
                        "type": "keyword"
                      }
                    }
                  },
                  "case_name": {
                    "analyzer": "legal_analyzer",
                    "fields": {
                      "keyword": {
                        "ignore_above": 512,
                        "type": "keyword"
                      }
                    },
                    "type": "text"
                  },
                  "case_number": {
                    "type": "keyword"
                  },
                  "category": {
                    "type": "keyword"
                  },
                  "charges": {
                    "properties": {
                      "class": {
                        "type": "keyword"
                      },
                      "count": {
                        "type": "integer"
                      },
                      "description": {
                        "analyzer": "legal_analyzer",
                        "type": "text"
                      },
                      "grade": {
                        "type": "keyword"
                      },
                      "statute": {
                        "type": "keyword"
                      }
                    },
                    "type": "nested"
                  },
                  "confidence": {
                    "type": "float"
                  },
                  "court": {
                    "properties": {
                      "county": {
                        "type": "keyword"
                      },
                      "district": {
                        "type": "keyword"
                      },
                      "division": {
                        "type": "keyword"
                      },
                      "id": {
                        "type": "keyword"
                      },
                      "jurisdiction": {
                        "type": "keyword"
                      },
                      "level": {
                        "type": "keyword"
                      },
                      "name": {
                        "type": "text"
                      }
                    }
                  },
                  "court_name": {
                    "fields": {
                      "keyword": {
                        "ignore_above": 512,
                        "type": "keyword"
                      }
                    },
                    "type": "text"
                  },
                  "decision_date": {
                    "type": "date"
                  },
                  "document_name": {
                    "fields": {
                      "keyword": {
                        "ignore_above": 512,
                        "type": "keyword"
                      }
                    },
                    "type": "text"
                  },
                  "document_type": {
                    "type": "keyword"
                  },
                  "event_date": {
                    "type": "date"
                  },
                  "filing_date": {
                    "type": "date"
                  },
                  "hearing_date": {
                    "type": "date"
                  },
                  "judge": {
                    "properties": {
                      "id": {
                        "type": "keyword"
                      },
                      "name": {
                        "type": "text"
                      },
                      "title": {
                        "type": "keyword"
                      }
                    }
                  },
                  "judge_name": {
                    "fields": {
                      "keyword": {
                        "ignore_above": 512,
                        "type": "keyword"
                      }
                    },
                    "type": "text"
                  },
                  "language": {
                    "type": "keyword"
                  },
                  "legal_tags": {
                    "type": "keyword"
                  },
                  "pages": {
                    "type": "integer"
                  },
                  "parties": {
                    "properties": {
                      "date": {
                        "type": "date"
                      },
                      "name": {
                        "fields": {
                          "keyword": {
                            "ignore_above": 512,
                            "type": "keyword"
                          }
                        },
                        "type": "text"
                      },
                      "party_type": {
                        "type": "keyword"
                      },
                      "role": {
                        "type": "keyword"
                      }
                    },
                    "type": "nested"
                  },
                  "processed_at": {
                    "type": "date"
                  },
                  "served_date": {
                    "type": "date"
                  },
                  "status": {
                    "type": "keyword"
                  },
                  "subject": {
                    "analyzer": "legal_analyzer",
                    "fields": {
                      "keyword": {
                        "ignore_above": 512,
                        "type": "keyword"
                      }
                    },
                    "type": "text"
                  },
                  "summary": {
                    "analyzer": "legal_analyzer",
                    "type": "text"
                  },
                  "timestamp": {
                    "type": "date"
                  },
                  "word_count": {
                    "type": "long"
                  }
                }
              },
              "public_url": {
                "index": false,
                "type": "keyword"
              },
              "size": {
                "type": "long"
              },
              "storage_key": {
                "type": "keyword"
              },
              "text": {
                "analyzer": "legal_analyzer",
                "type": "text"
              },
              "updated_at": {
                "type": "date"
              }
            }
          },
          "settings": {
            "analysis": {
              "analyzer": {
                "legal_analyzer": {
                  "filter": [
                    "lowercase",
                    "english_stop",
                    "english_stemmer",
                    "legal_synonyms"
                  ],
                  "tokenizer": "standard",
                  "type": "custom"
                }
              },
              "filter": {
                "english_stemmer": {
                  "language": "english",
                  "type": "stemmer"
                },
                "english_stop": {
                  "stopwords": "_english_",
                  "type": "stop"
                },
                "legal_synonyms": {
                  "synonyms": [
                    "motion,petition",
                    "defendant,accused,respondent",
                    "suppress,exclude,prohibit",
                    "attorney,counsel,lawyer",
                    "judgment,decree",
                    "plaintiff,petitioner,complainant"
                  ],
                  "type": "synonym"
                }
              }
            },
            "number_of_replicas": 0,
            "number_of_shards": 1
          }
        }
        "###);
    }

    #[test]
    fn entity_collections_are_nested() {
        let definition = index_definition();
        for field in ["parties", "attorneys", "charges", "authorities"] {
            assert_eq!(
                definition["mappings"]["properties"]["metadata"]["properties"][field]["type"],
                "nested",
                "{field} must be nested"
            );
        }
    }

    #[test]
    fn synonyms_cover_the_core_legal_equivalences() {
        assert!(LEGAL_SYNONYMS.contains(&"motion,petition"));
        assert!(LEGAL_SYNONYMS.contains(&"defendant,accused,respondent"));
        assert!(LEGAL_SYNONYMS.contains(&"suppress,exclude,prohibit"));
    }
}
